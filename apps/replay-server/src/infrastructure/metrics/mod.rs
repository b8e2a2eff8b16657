//! Prometheus Metrics Module
//!
//! Exposes replay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Fan-out**: Messages delivered, subscribers evicted, live subscribers
//! - **Playback**: Events suppressed by watermarks, seeks
//! - **Windows**: Window loads by outcome and load latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::replay::Channel;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Fan-out
    describe_counter!(
        "replay_messages_broadcast_total",
        "Total messages delivered to subscribers"
    );
    describe_counter!(
        "replay_subscribers_evicted_total",
        "Total subscribers dropped after a failed or timed-out send"
    );
    describe_gauge!("replay_subscribers", "Number of connected subscribers");

    // Playback
    describe_counter!(
        "replay_events_suppressed_total",
        "Total events skipped by the channel watermark guard"
    );
    describe_counter!("replay_seeks_total", "Total skip and go-back operations");

    // Windows
    describe_counter!(
        "replay_window_loads_total",
        "Total window loads by outcome"
    );
    describe_histogram!(
        "replay_window_load_seconds",
        "Time to query and assemble one replay window"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for window loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLoadOutcome {
    /// Queried and assembled.
    Ok,
    /// Store failed; an empty window was substituted.
    Error,
    /// Served from a completed or in-flight prefetch.
    Prefetched,
}

impl WindowLoadOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Prefetched => "prefetched",
        }
    }
}

/// Direction label for seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Skip ahead.
    Forward,
    /// Go back.
    Backward,
}

impl SeekDirection {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Record messages delivered on a channel.
pub fn record_messages_broadcast(channel: Channel, count: u64) {
    counter!(
        "replay_messages_broadcast_total",
        "channel" => channel.as_str()
    )
    .increment(count);
}

/// Record subscribers evicted from a channel.
pub fn record_subscribers_evicted(channel: Channel, count: u64) {
    counter!(
        "replay_subscribers_evicted_total",
        "channel" => channel.as_str()
    )
    .increment(count);
}

/// Update the subscriber count for a channel.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(channel: Channel, count: usize) {
    gauge!("replay_subscribers", "channel" => channel.as_str()).set(count as f64);
}

/// Record an event skipped by the watermark guard.
pub fn record_event_suppressed(channel: Channel) {
    counter!(
        "replay_events_suppressed_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a window load.
pub fn record_window_load(outcome: WindowLoadOutcome) {
    counter!("replay_window_loads_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record window load latency.
pub fn record_window_load_duration(duration: Duration) {
    histogram!("replay_window_load_seconds").record(duration.as_secs_f64());
}

/// Record a seek.
pub fn record_seek(direction: SeekDirection) {
    counter!("replay_seeks_total", "direction" => direction.as_str()).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
