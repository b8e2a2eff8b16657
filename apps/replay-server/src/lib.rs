#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Replay Server - Battlefield Session Replay
//!
//! Replays a recorded training session (soldier movement, kill feed and
//! soldier stats) to WebSocket subscribers in original time order, at
//! variable speed, with pause, resume, skip and go-back.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Recorded sessions and replay types
//!   - `time`: Heterogeneous timestamps and clocks
//!   - `session`: Typed session documents and range queries
//!   - `replay`: Events, sorted windows, cursor and watermarks
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `EventStore` and `BroadcastPort`
//!   - `services`: Window buffer, scheduler, controller and control surface
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `store`: In-memory and JSON-directory session stores
//!   - `broadcast`: Per-topic subscriber fan-out
//!   - `http`: Control API and WebSocket topics
//!   - `health`: Health check and metrics endpoint
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Session store ──► WindowBuffer ──► Scheduler ──► ChannelHub ──► /ws/raw
//!                        ▲               ▲                   ├──► /ws/killfeed
//!                        └── prefetch    │                   └──► /ws/stats
//!                                  ReplayController ◄── POST /control/{id}
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Recorded sessions and replay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::replay::{Channel, ReplayEvent, Window};
pub use domain::session::Session;
pub use domain::time::{Clock, FixedClock, SharedClock, SystemClock, Timestamp};

// Ports
pub use application::ports::{BroadcastPort, EventStore, StoreError};

// Replay engine
pub use application::services::replay::{
    ControlRequest, ControlResponse, PlaybackPosition, PlaybackStatus, ReplayController,
    ReplayError, ReplayService, ReplaySettings,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ServerSettings, ServiceConfig};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::http::{ApiServer, ApiServerError, AppState};

// Adapters
pub use infrastructure::broadcast::{BroadcastConfig, ChannelHub, SubscriberCounts};
pub use infrastructure::store::{InMemoryEventStore, JsonDirEventStore};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
