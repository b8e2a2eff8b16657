//! Replay Scheduler
//!
//! The playback loop. Each iteration takes the event under the cursor,
//! publishes it if its channel watermark admits it, and then sleeps for the
//! gap to the next event scaled by the playback speed. Exhausting a window
//! loads the next contiguous one, paced from the last processed event;
//! exhausting the last window completes the replay.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::infrastructure::metrics;

use super::controller::Shared;

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoopExit {
    /// Every event up to the session end was processed.
    Completed,
    /// Stop was requested.
    Cancelled,
}

/// Outcome of one iteration.
enum Step {
    /// Sleep before the next iteration.
    Wait(Duration),
    /// Re-evaluate immediately.
    Continue,
    /// Session end reached.
    Completed,
}

/// Run playback until completion or cancellation.
pub(super) async fn run(shared: Arc<Shared>, cancel: CancellationToken) -> LoopExit {
    loop {
        if cancel.is_cancelled() {
            return LoopExit::Cancelled;
        }

        if shared.controls.is_paused() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return LoopExit::Cancelled,
                () = shared.resumed.notified() => {}
                () = tokio::time::sleep(shared.settings.pause_poll) => {}
            }
            continue;
        }

        let step = tokio::select! {
            biased;
            () = cancel.cancelled() => return LoopExit::Cancelled,
            step = advance(&shared) => step,
        };

        match step {
            Step::Completed => return LoopExit::Completed,
            Step::Continue => {}
            Step::Wait(delay) if delay.is_zero() => {}
            Step::Wait(delay) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return LoopExit::Cancelled,
                    () = shared.seeked.notified() => {}
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn advance(shared: &Shared) -> Step {
    let mut state = shared.state.lock().await;
    let window = Arc::clone(&state.window);
    let index = state.cursor.current_index;

    let Some(event) = window.get(index) else {
        let end = window.end();
        if end >= shared.bounds.end {
            return Step::Completed;
        }
        let next = shared.buffer.load(end).await;
        // Events stamped `end` were only delivered if the window being left
        // actually held them.
        let first = if window.is_empty() {
            next.find_index(end)
        } else {
            next.first_after(end)
        };
        let delay = next.get(first).map_or(Duration::ZERO, |event| {
            scaled_delay(
                state.cursor.current_instant,
                event.instant(),
                shared.controls.speed(),
            )
        });
        state.cursor.current_index = first;
        state.window = Arc::new(next);
        return Step::Wait(delay);
    };

    let instant = event.instant();
    let channel = event.channel();
    state.cursor.current_instant = instant;

    if state.cursor.watermarks.admits(channel, instant) {
        let delivered = shared.port.publish(event).await;
        state.cursor.watermarks.set(channel, instant);
        trace!(channel = channel.as_str(), instant = %instant, delivered, "Replayed event");
    } else {
        metrics::record_event_suppressed(channel);
        debug!(
            channel = channel.as_str(),
            instant = %instant,
            watermark = %state.cursor.watermarks.get(channel),
            "Suppressed stale event"
        );
    }

    let next_index = index + 1;
    state.cursor.current_index = next_index;
    drop(state);

    #[allow(clippy::cast_precision_loss)]
    let progress = next_index as f64 / window.len() as f64;
    if progress > shared.settings.prefetch_threshold && window.end() < shared.bounds.end {
        shared.buffer.prefetch(window.end());
    }

    window.get(next_index).map_or(Step::Continue, |next| {
        Step::Wait(scaled_delay(instant, next.instant(), shared.controls.speed()))
    })
}

/// Session-time gap between two events divided by the playback speed.
pub(super) fn scaled_delay(current: DateTime<Utc>, next: DateTime<Utc>, speed: f64) -> Duration {
    let gap = (next - current).to_std().unwrap_or(Duration::ZERO);
    gap.div_f64(speed)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use test_case::test_case;

    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 6, 11, 0, 0).unwrap() + TimeDelta::milliseconds(millis)
    }

    #[test_case(0, 10_000, 1.0, 10_000 ; "real time")]
    #[test_case(0, 10_000, 2.0, 5_000 ; "double speed")]
    #[test_case(0, 10_000, 0.5, 20_000 ; "half speed")]
    #[test_case(5_000, 5_000, 1.0, 0 ; "simultaneous")]
    #[test_case(5_000, 1_000, 1.0, 0 ; "out of order")]
    fn delay_scales_with_speed(current: i64, next: i64, speed: f64, expected_millis: u64) {
        assert_eq!(
            scaled_delay(at(current), at(next), speed),
            Duration::from_millis(expected_millis)
        );
    }
}
