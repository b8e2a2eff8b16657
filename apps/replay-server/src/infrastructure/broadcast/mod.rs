//! Broadcast Channel Adapters
//!
//! Fan-out of replayed events to WebSocket subscribers.
//!
//! # Architecture
//!
//! The `ChannelHub` owns one `BroadcastChannel` per topic:
//! - `raw`: soldier movement
//! - `killfeed`: kill events
//! - `stats`: soldier stats
//!
//! Each channel keeps its own subscriber map. A broadcast serializes the
//! message once, sends it to every subscriber concurrently with a bounded
//! timeout, and evicts every subscriber whose send failed. Delivery is
//! at-most-once with no retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::ports::BroadcastPort;
use crate::domain::replay::{Channel, ReplayEvent};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Per-subscriber delivery limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Messages queued per subscriber before sends start waiting.
    pub subscriber_queue: usize,
    /// How long one send may wait on a full queue before the subscriber is
    /// evicted.
    pub send_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_queue: 1024,
            send_timeout: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Receiving end of one subscriber. Dropping it closes the queue, so the
/// next broadcast evicts the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    /// Subscriber id, used to unsubscribe.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Next serialized message, or `None` once the subscriber was evicted.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }
}

// =============================================================================
// Broadcast Channel
// =============================================================================

/// One topic and its connected subscribers.
#[derive(Debug)]
pub struct BroadcastChannel {
    channel: Channel,
    config: BroadcastConfig,
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<Arc<str>>>>,
}

impl BroadcastChannel {
    /// Create an empty channel.
    #[must_use]
    pub fn new(channel: Channel, config: BroadcastConfig) -> Self {
        Self {
            channel,
            config,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Topic this channel serves.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Register a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.config.subscriber_queue.max(1));
        let id = Uuid::new_v4();
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, sender);
            subscribers.len()
        };
        metrics::set_subscribers(self.channel, count);
        tracing::info!(channel = self.channel.as_str(), subscriber = %id, subscribers = count, "Subscriber connected");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            metrics::set_subscribers(self.channel, count);
            tracing::info!(channel = self.channel.as_str(), subscriber = %id, subscribers = count, "Subscriber disconnected");
        }
        removed
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Serialize `message` once and deliver it to every subscriber.
    /// Returns the number of subscribers that accepted it.
    pub async fn broadcast<T: Serialize + Sync>(&self, message: &T) -> usize {
        match serde_json::to_string(message) {
            Ok(text) => self.broadcast_text(Arc::from(text)).await,
            Err(error) => {
                tracing::warn!(channel = self.channel.as_str(), error = %error, "Failed to serialize broadcast");
                0
            }
        }
    }

    /// Deliver an already serialized message to every subscriber.
    pub async fn broadcast_text(&self, text: Arc<str>) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<Arc<str>>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let timeout = self.config.send_timeout;
        let results = join_all(targets.into_iter().map(|(id, sender)| {
            let text = Arc::clone(&text);
            async move { (id, sender.send_timeout(text, timeout).await.is_ok()) }
        }))
        .await;

        let failed: Vec<Uuid> = results
            .iter()
            .filter(|(_, delivered)| !delivered)
            .map(|(id, _)| *id)
            .collect();
        let delivered = results.len() - failed.len();

        if !failed.is_empty() {
            let count = {
                let mut subscribers = self.subscribers.write();
                for id in &failed {
                    subscribers.remove(id);
                }
                subscribers.len()
            };
            metrics::record_subscribers_evicted(self.channel, failed.len() as u64);
            metrics::set_subscribers(self.channel, count);
            tracing::warn!(
                channel = self.channel.as_str(),
                evicted = failed.len(),
                subscribers = count,
                "Evicted unresponsive subscribers"
            );
        }

        metrics::record_messages_broadcast(self.channel, delivered as u64);
        delivered
    }
}

// =============================================================================
// Channel Hub
// =============================================================================

/// Subscriber counts per topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberCounts {
    /// Movement subscribers.
    pub raw: usize,
    /// Kill feed subscribers.
    pub killfeed: usize,
    /// Stats subscribers.
    pub stats: usize,
}

impl SubscriberCounts {
    /// Subscribers across all topics.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.raw + self.killfeed + self.stats
    }
}

/// The three replay topics.
#[derive(Debug)]
pub struct ChannelHub {
    raw: BroadcastChannel,
    killfeed: BroadcastChannel,
    stats: BroadcastChannel,
}

impl ChannelHub {
    /// Create a hub with empty channels.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            raw: BroadcastChannel::new(Channel::Raw, config),
            killfeed: BroadcastChannel::new(Channel::KillFeed, config),
            stats: BroadcastChannel::new(Channel::Stats, config),
        }
    }

    /// The channel serving `channel`.
    #[must_use]
    pub const fn channel(&self, channel: Channel) -> &BroadcastChannel {
        match channel {
            Channel::Raw => &self.raw,
            Channel::KillFeed => &self.killfeed,
            Channel::Stats => &self.stats,
        }
    }

    /// Subscriber counts per topic.
    #[must_use]
    pub fn subscriber_counts(&self) -> SubscriberCounts {
        SubscriberCounts {
            raw: self.raw.subscriber_count(),
            killfeed: self.killfeed.subscriber_count(),
            stats: self.stats.subscriber_count(),
        }
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

#[async_trait]
impl BroadcastPort for ChannelHub {
    async fn publish(&self, event: &ReplayEvent) -> usize {
        self.channel(event.channel()).broadcast(event).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::replay::KillFeedEvent;

    fn kill() -> ReplayEvent {
        ReplayEvent::KillFeed(KillFeedEvent {
            attacker_id: "S1".to_string(),
            attacker_call_sign: "Alpha1".to_string(),
            victim_id: "S2".to_string(),
            victim_call_sign: "Bravo2".to_string(),
            distance_to_victim: Some(42.0),
            instant: Utc.with_ymd_and_hms(2024, 12, 6, 11, 0, 0).unwrap(),
        })
    }

    #[test]
    fn subscriber_count_tracks_subscribe_and_unsubscribe() {
        let channel = BroadcastChannel::new(Channel::Raw, BroadcastConfig::default());

        let first = channel.subscribe();
        let _second = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        assert!(channel.unsubscribe(first.id()));
        assert!(!channel.unsubscribe(first.id()));
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let channel = BroadcastChannel::new(Channel::Stats, BroadcastConfig::default());
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        let delivered = channel.broadcast(&serde_json::json!({ "n": 1 })).await;

        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.as_deref(), Some(r#"{"n":1}"#));
        assert_eq!(second.recv().await.as_deref(), Some(r#"{"n":1}"#));
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_delivers_nothing() {
        let channel = BroadcastChannel::new(Channel::Raw, BroadcastConfig::default());
        assert_eq!(channel.broadcast_text(Arc::from("x")).await, 0);
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_without_affecting_others() {
        let channel = BroadcastChannel::new(Channel::KillFeed, BroadcastConfig::default());
        let dropped = channel.subscribe();
        let mut live = channel.subscribe();
        drop(dropped);

        let delivered = channel.broadcast_text(Arc::from("hello")).await;

        assert_eq!(delivered, 1);
        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(live.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_subscriber_is_evicted_after_timeout() {
        let config = BroadcastConfig {
            subscriber_queue: 1,
            send_timeout: Duration::from_millis(100),
        };
        let channel = BroadcastChannel::new(Channel::Raw, config);
        let mut slow = channel.subscribe();
        let mut fast = channel.subscribe();

        assert_eq!(channel.broadcast_text(Arc::from("one")).await, 2);
        assert_eq!(fast.recv().await.as_deref(), Some("one"));

        assert_eq!(channel.broadcast_text(Arc::from("two")).await, 1);
        assert_eq!(channel.subscriber_count(), 1);
        assert_eq!(fast.recv().await.as_deref(), Some("two"));

        assert_eq!(slow.recv().await.as_deref(), Some("one"));
        assert_eq!(slow.recv().await, None);
    }

    #[tokio::test]
    async fn hub_routes_events_by_channel() {
        let hub = ChannelHub::default();
        let mut killfeed = hub.channel(Channel::KillFeed).subscribe();
        let _raw = hub.channel(Channel::Raw).subscribe();

        let delivered = hub.publish(&kill()).await;

        assert_eq!(delivered, 1);
        let text = killfeed.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "kill_feed");
        assert_eq!(value["victim_id"], "S2");
        assert_eq!(
            hub.subscriber_counts(),
            SubscriberCounts {
                raw: 1,
                killfeed: 1,
                stats: 0,
            }
        );
        assert_eq!(hub.subscriber_counts().total(), 2);
    }
}
