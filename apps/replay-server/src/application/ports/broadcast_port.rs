//! Broadcast Port (Driven Port)
//!
//! Interface for fanning replay events out to subscribers. Delivery is
//! best-effort and never fails the caller.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::replay::{Channel, ReplayEvent};

/// Port for publishing replay events.
#[async_trait]
pub trait BroadcastPort: Send + Sync {
    /// Publish `event` on its channel. Returns how many subscribers received it.
    async fn publish(&self, event: &ReplayEvent) -> usize;
}

/// In-memory broadcaster that records everything it is asked to publish.
#[derive(Debug, Default)]
pub struct RecordingBroadcast {
    events: Mutex<Vec<ReplayEvent>>,
}

impl RecordingBroadcast {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every published event.
    #[must_use]
    pub fn events(&self) -> Vec<ReplayEvent> {
        self.events.lock().clone()
    }

    /// Published events on one channel.
    #[must_use]
    pub fn on_channel(&self, channel: Channel) -> Vec<ReplayEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.channel() == channel)
            .cloned()
            .collect()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<ReplayEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[async_trait]
impl BroadcastPort for RecordingBroadcast {
    async fn publish(&self, event: &ReplayEvent) -> usize {
        self.events.lock().push(event.clone());
        1
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::session::{KillRecord, StatRecord, SoldierMeta, Team};

    #[tokio::test]
    async fn records_in_publish_order() {
        let recorder = RecordingBroadcast::new();
        let kill = ReplayEvent::from(KillRecord {
            instant: Utc::now(),
            attacker_id: "A".to_string(),
            attacker_call_sign: "Alpha".to_string(),
            victim_id: "B".to_string(),
            victim_call_sign: "Bravo".to_string(),
            distance: None,
        });
        let stat = ReplayEvent::from(StatRecord {
            soldier: SoldierMeta {
                soldier_id: "A".to_string(),
                team: Team::Red,
                call_sign: "Alpha".to_string(),
            },
            instant: Utc::now(),
            health: 100.0,
            kills: 1,
            bullets_fired: 4,
        });

        assert_eq!(recorder.publish(&kill).await, 1);
        assert_eq!(recorder.publish(&stat).await, 1);

        assert_eq!(recorder.events(), vec![kill.clone(), stat]);
        assert_eq!(recorder.on_channel(Channel::KillFeed), vec![kill]);
        assert_eq!(recorder.take().len(), 2);
        assert!(recorder.events().is_empty());
    }
}
