//! Event Store Adapters
//!
//! Implementations of [`EventStore`] over recorded session documents.
//!
//! - [`InMemoryEventStore`]: sessions held in memory
//! - [`JsonDirEventStore`]: one `<session_id>.json` document per session in
//!   a directory, re-read on every lookup and cached for window queries

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::application::ports::{EventStore, StoreError};
use crate::domain::session::{KillRecord, Session, SoldierTrack, StatRecord};
use crate::domain::time::SharedClock;

// =============================================================================
// In-Memory Store
// =============================================================================

/// Sessions held in memory, keyed by id.
#[derive(Debug)]
pub struct InMemoryEventStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    clock: SharedClock,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Create a store holding `sessions`.
    #[must_use]
    pub fn with_sessions(clock: SharedClock, sessions: impl IntoIterator<Item = Session>) -> Self {
        let store = Self::new(clock);
        for session in sessions {
            store.insert(session);
        }
        store
    }

    /// Add or replace a session.
    pub fn insert(&self, session: Session) {
        self.sessions
            .write()
            .insert(session.session_id.clone(), Arc::new(session));
    }

    fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_session(&self, session_id: &str) -> Result<Option<Arc<Session>>, StoreError> {
        Ok(self.get(session_id))
    }

    async fn query_soldier_movement(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SoldierTrack>, StoreError> {
        Ok(self.get(session_id).map_or_else(Vec::new, |session| {
            session.movement_between(start, end, self.clock.as_ref())
        }))
    }

    async fn query_kill_events(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<KillRecord>, StoreError> {
        Ok(self.get(session_id).map_or_else(Vec::new, |session| {
            session.kills_between(start, end, self.clock.as_ref())
        }))
    }

    async fn query_stats(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatRecord>, StoreError> {
        Ok(self.get(session_id).map_or_else(Vec::new, |session| {
            session.stats_between(start, end, self.clock.as_ref())
        }))
    }
}

// =============================================================================
// JSON Directory Store
// =============================================================================

/// Session documents stored as `<dir>/<session_id>.json`.
#[derive(Debug)]
pub struct JsonDirEventStore {
    dir: PathBuf,
    clock: SharedClock,
    cache: RwLock<HashMap<String, Arc<Session>>>,
}

impl JsonDirEventStore {
    /// Create a store reading from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            dir: dir.into(),
            clock,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Directory holding the documents.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for a session id; `None` for ids that are not plain
    /// file names.
    fn path_for(&self, session_id: &str) -> Option<PathBuf> {
        let plain = !session_id.is_empty()
            && !session_id.starts_with('.')
            && !session_id.contains(['/', '\\'])
            && !session_id.contains("..");
        plain.then(|| self.dir.join(format!("{session_id}.json")))
    }

    /// Read and decode the document for `session_id`.
    async fn read_document(&self, session_id: &str) -> Result<Option<Arc<Session>>, StoreError> {
        let Some(path) = self.path_for(session_id) else {
            debug!(session_id = %session_id, "Rejected session id");
            return Ok(None);
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StoreError::Io(error)),
        };
        let session: Session =
            serde_json::from_slice(&bytes).map_err(|error| StoreError::Decode {
                message: format!("{}: {error}", path.display()),
            })?;

        info!(
            session_id = %session_id,
            path = %path.display(),
            soldiers = session.participated_soldiers.len(),
            "Loaded session document"
        );
        Ok(Some(Arc::new(session)))
    }

    /// Cached document for window queries, read on a miss.
    async fn cached(&self, session_id: &str) -> Result<Option<Arc<Session>>, StoreError> {
        let cached = self.cache.read().get(session_id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let session = self.read_document(session_id).await?;
        if let Some(session) = &session {
            self.cache
                .write()
                .insert(session_id.to_string(), Arc::clone(session));
        }
        Ok(session)
    }
}

#[async_trait]
impl EventStore for JsonDirEventStore {
    /// Always re-reads the document. The decoded copy replaces every other
    /// cached session and serves window queries until the next lookup.
    async fn find_session(&self, session_id: &str) -> Result<Option<Arc<Session>>, StoreError> {
        let session = self.read_document(session_id).await?;
        let mut cache = self.cache.write();
        cache.clear();
        if let Some(session) = &session {
            cache.insert(session_id.to_string(), Arc::clone(session));
        }
        Ok(session)
    }

    async fn query_soldier_movement(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SoldierTrack>, StoreError> {
        Ok(self.cached(session_id).await?.map_or_else(Vec::new, |session| {
            session.movement_between(start, end, self.clock.as_ref())
        }))
    }

    async fn query_kill_events(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<KillRecord>, StoreError> {
        Ok(self.cached(session_id).await?.map_or_else(Vec::new, |session| {
            session.kills_between(start, end, self.clock.as_ref())
        }))
    }

    async fn query_stats(
        &self,
        session_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatRecord>, StoreError> {
        Ok(self.cached(session_id).await?.map_or_else(Vec::new, |session| {
            session.stats_between(start, end, self.clock.as_ref())
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let metadata = tokio::fs::metadata(&self.dir).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                message: format!("{} is not a directory", self.dir.display()),
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::domain::time::FixedClock;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 6, 11, 0, 0).unwrap()
    }

    fn clock() -> SharedClock {
        Arc::new(FixedClock::new(base()))
    }

    fn document(session_id: &str) -> serde_json::Value {
        let at = |secs: i64| (base() + TimeDelta::seconds(secs)).to_rfc3339();
        json!({
            "session_id": session_id,
            "participated_soldiers": [{
                "soldier_id": "S1",
                "call_sign": "Alpha1",
                "team": "red",
                "location": [
                    { "latitude": 1.0, "longitude": 2.0, "timestamp": at(0) },
                    { "latitude": 1.5, "longitude": 2.5, "timestamp": at(30) }
                ],
                "orientation": [
                    { "roll": 0.0, "pitch": 0.0, "yaw": 10.0, "timestamp": at(0) },
                    { "roll": 0.0, "pitch": 0.0, "yaw": 20.0, "timestamp": at(30) }
                ],
                "stats": [{ "kill_count": 1, "bullets_fired": 4, "timestamp": at(20) }]
            }],
            "events": [{
                "attacker_id": "S1",
                "attacker_call_sign": "Alpha1",
                "victim_id": "S9",
                "victim_call_sign": "Zulu9",
                "distance_to_victim": 40.0,
                "timestamp": at(20)
            }]
        })
    }

    #[tokio::test]
    async fn in_memory_queries_by_range() {
        let session: Session = serde_json::from_value(document("s1")).unwrap();
        let store = InMemoryEventStore::with_sessions(clock(), [session]);

        assert!(store.find_session("s1").await.unwrap().is_some());
        assert!(store.find_session("missing").await.unwrap().is_none());

        let tracks = store
            .query_soldier_movement("s1", base(), base() + TimeDelta::seconds(10))
            .await
            .unwrap();
        assert_eq!(tracks[0].samples.len(), 1);

        let kills = store
            .query_kill_events("s1", base(), base() + TimeDelta::seconds(20))
            .await
            .unwrap();
        assert_eq!(kills.len(), 1);

        let stats = store
            .query_stats("missing", base(), base() + TimeDelta::seconds(60))
            .await
            .unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn json_dir_reads_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("s1.json"),
            serde_json::to_vec(&document("s1")).unwrap(),
        )
        .unwrap();
        let store = JsonDirEventStore::new(dir.path(), clock());

        let session = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(session.participated_soldiers.len(), 1);

        let stats = store
            .query_stats("s1", base(), base() + TimeDelta::seconds(60))
            .await
            .unwrap();
        assert_eq!(stats[0].kills, 1);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn json_dir_window_queries_reuse_decoded_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.json");
        std::fs::write(&path, serde_json::to_vec(&document("s1")).unwrap()).unwrap();
        let store = JsonDirEventStore::new(dir.path(), clock());

        assert!(store.find_session("s1").await.unwrap().is_some());
        std::fs::remove_file(&path).unwrap();

        let kills = store
            .query_kill_events("s1", base(), base() + TimeDelta::seconds(60))
            .await
            .unwrap();
        assert_eq!(kills.len(), 1);
        assert!(store.find_session("s1").await.unwrap().is_none());
        assert!(store.cache.read().is_empty());
    }

    #[tokio::test]
    async fn json_dir_rereads_changed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.json");
        let mut doc = document("s1");
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        let store = JsonDirEventStore::new(dir.path(), clock());

        let first = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(first.participated_soldiers[0].location.len(), 2);

        let extra = (1..=3)
            .map(|i| json!({ "latitude": 1.0, "longitude": 2.0, "timestamp": (base() + TimeDelta::seconds(40 + i)).to_rfc3339() }));
        doc["participated_soldiers"][0]["location"]
            .as_array_mut()
            .unwrap()
            .extend(extra);
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let second = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(second.participated_soldiers[0].location.len(), 5);
    }

    #[tokio::test]
    async fn json_dir_keeps_only_the_last_found_session() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["s1", "s2"] {
            std::fs::write(
                dir.path().join(format!("{id}.json")),
                serde_json::to_vec(&document(id)).unwrap(),
            )
            .unwrap();
        }
        let store = JsonDirEventStore::new(dir.path(), clock());

        store.find_session("s1").await.unwrap();
        store.find_session("s2").await.unwrap();

        let cached: Vec<String> = store.cache.read().keys().cloned().collect();
        assert_eq!(cached, ["s2"]);
    }

    #[tokio::test]
    async fn json_dir_missing_and_unsafe_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirEventStore::new(dir.path(), clock());

        assert!(store.find_session("nope").await.unwrap().is_none());
        assert!(store.find_session("../etc/passwd").await.unwrap().is_none());
        assert!(store.find_session("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_dir_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{ not json").unwrap();
        let store = JsonDirEventStore::new(dir.path(), clock());

        let error = store.find_session("bad").await.unwrap_err();
        assert!(matches!(error, StoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn ping_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirEventStore::new(dir.path().join("absent"), clock());
        assert!(matches!(store.ping().await, Err(StoreError::Io(_))));
    }
}
