//! Application Ports (Driven)
//!
//! Interfaces the replay engine uses to reach the outside world:
//! - `EventStore`: reads recorded sessions by time range
//! - `BroadcastPort`: publishes replay events to subscribers

mod broadcast_port;
mod event_store_port;

pub use broadcast_port::{BroadcastPort, RecordingBroadcast};
#[cfg(test)]
pub use event_store_port::MockEventStore;
pub use event_store_port::{EventStore, StoreError};
