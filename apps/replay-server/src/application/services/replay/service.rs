//! Replay Service
//!
//! Control surface exposed to the API layer. At most one session replays at
//! a time; selecting a new session stops the previous one.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::application::ports::{BroadcastPort, EventStore, StoreError};
use crate::domain::time::SharedClock;

use super::command::{ControlCommand, ControlRequest, ControlResponse, SelectSessionResponse};
use super::controller::{PlaybackPosition, ReplayController};
use super::error::ReplayError;
use super::settings::ReplaySettings;

/// Owns the active replay and dispatches control commands to it.
pub struct ReplayService {
    store: Arc<dyn EventStore>,
    port: Arc<dyn BroadcastPort>,
    clock: SharedClock,
    settings: ReplaySettings,
    active: Mutex<Option<Arc<ReplayController>>>,
}

impl std::fmt::Debug for ReplayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayService")
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ReplayService {
    /// Create a service with no active replay.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        port: Arc<dyn BroadcastPort>,
        clock: SharedClock,
        settings: ReplaySettings,
    ) -> Self {
        Self {
            store,
            port,
            clock,
            settings,
            active: Mutex::new(None),
        }
    }

    /// Initialize and start a replay of `session_id`, replacing any active one.
    ///
    /// The new session is initialized before the previous replay is touched,
    /// so a failed selection leaves the active replay running.
    ///
    /// # Errors
    ///
    /// Returns the initialization failure (unknown session, invalid
    /// document, or store failure).
    pub async fn select_session(
        &self,
        session_id: &str,
    ) -> Result<SelectSessionResponse, ReplayError> {
        let mut active = self.active.lock().await;

        let controller = ReplayController::initialize(
            session_id,
            Arc::clone(&self.store),
            Arc::clone(&self.port),
            Arc::clone(&self.clock),
            self.settings.clone(),
        )
        .await
        .inspect_err(|error| {
            error!(session_id = %session_id, error = %error, "Failed to initialize replay");
        })?;

        if let Some(previous) = active.take() {
            info!(
                previous = %previous.session_id(),
                next = %session_id,
                "Stopping previous replay"
            );
            previous.stop().await;
        }

        controller.start().await;
        *active = Some(Arc::new(controller));
        Ok(SelectSessionResponse::started(session_id))
    }

    /// Apply a control command to the active replay of `session_id`.
    ///
    /// # Errors
    ///
    /// Invalid commands and parameters, and sessions other than the active
    /// one, are rejected without touching playback.
    pub async fn control(
        &self,
        session_id: &str,
        request: &ControlRequest,
    ) -> Result<ControlResponse, ReplayError> {
        let command = ControlCommand::try_from(request)?;
        let controller = self.controller_for(session_id).await?;
        info!(session_id = %session_id, command = command.name(), "Replay control command");

        let response = ControlResponse::success(command);
        Ok(match command {
            ControlCommand::Pause => {
                controller.pause();
                response
            }
            ControlCommand::Resume => {
                controller.resume();
                controller.start().await;
                response
            }
            ControlCommand::Stop => {
                controller.stop().await;
                let mut active = self.active.lock().await;
                if active
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &controller))
                {
                    *active = None;
                }
                response
            }
            ControlCommand::Speed(speed) => response.with_speed(controller.set_speed(speed)),
            ControlCommand::Skip(seconds) => response.with_position(controller.skip(seconds).await),
            ControlCommand::GoBack(seconds) => {
                response.with_position(controller.go_back(seconds).await)
            }
        })
    }

    async fn controller_for(&self, session_id: &str) -> Result<Arc<ReplayController>, ReplayError> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|controller| controller.session_id() == session_id)
            .cloned()
            .ok_or_else(|| ReplayError::NoActiveReplay {
                session_id: session_id.to_string(),
            })
    }

    /// Active controller, if any.
    pub async fn active(&self) -> Option<Arc<ReplayController>> {
        self.active.lock().await.clone()
    }

    /// Id of the active session, if any.
    pub async fn active_session(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|controller| controller.session_id().to_string())
    }

    /// Position of the active replay, if any.
    pub async fn status(&self) -> Option<PlaybackPosition> {
        let controller = self.active().await?;
        Some(controller.position().await)
    }

    /// Check the backing store is reachable.
    ///
    /// # Errors
    ///
    /// Returns the store's failure.
    pub async fn ping_store(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    /// Stop the active replay, awaiting its scheduler.
    pub async fn shutdown(&self) {
        let previous = self.active.lock().await.take();
        if let Some(controller) = previous {
            controller.stop().await;
        }
    }
}
