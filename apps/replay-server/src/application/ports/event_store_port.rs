//! Event Store Port (Driven Port)
//!
//! Read access to recorded sessions. All time filters are inclusive on both
//! ends.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::session::{KillRecord, Session, SoldierTrack, StatRecord};

/// Event store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("Event store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be decoded.
    #[error("Session document decode error: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },

    /// The store cannot serve requests.
    #[error("Event store unavailable: {message}")]
    Unavailable {
        /// Reason.
        message: String,
    },
}

/// Port for reading recorded sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch a session document, `None` if it does not exist.
    async fn find_session(&self, session_id: &str) -> Result<Option<Arc<Session>>, StoreError>;

    /// Per-soldier movement samples with instants in `[start, end]`.
    async fn query_soldier_movement(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SoldierTrack>, StoreError>;

    /// Kill events with instants in `[start, end]`.
    async fn query_kill_events(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<KillRecord>, StoreError>;

    /// Stat samples with instants in `[start, end]`.
    async fn query_stats(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatRecord>, StoreError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
