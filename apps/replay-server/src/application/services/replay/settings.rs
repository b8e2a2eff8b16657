//! Playback tuning.

use std::time::Duration;

use chrono::TimeDelta;

/// Slowest allowed playback speed.
pub const MIN_SPEED: f64 = 0.1;

/// Fastest allowed playback speed.
pub const MAX_SPEED: f64 = 5.0;

/// Speed a replay starts at.
pub const DEFAULT_SPEED: f64 = 1.0;

/// Clamp a requested speed into `[MIN_SPEED, MAX_SPEED]`. NaN maps to the default.
#[must_use]
pub fn clamp_speed(requested: f64) -> f64 {
    if requested.is_nan() {
        return DEFAULT_SPEED;
    }
    requested.clamp(MIN_SPEED, MAX_SPEED)
}

/// Replay engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySettings {
    /// Span of session time held in one window.
    pub window_size: Duration,
    /// Fraction of a window consumed before the next one is prefetched.
    pub prefetch_threshold: f64,
    /// Re-check interval while paused.
    pub pause_poll: Duration,
    /// Pre-context loaded before a seek target.
    pub seek_context: Duration,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            window_size: Duration::from_secs(300),
            prefetch_threshold: 0.8,
            pause_poll: Duration::from_millis(500),
            seek_context: Duration::from_secs(30),
        }
    }
}

impl ReplaySettings {
    /// Window size as a session-time delta.
    #[must_use]
    pub fn window_delta(&self) -> TimeDelta {
        to_delta(self.window_size)
    }

    /// Seek pre-context as a session-time delta, never wider than a window
    /// so the reloaded window still covers the target.
    #[must_use]
    pub fn seek_context_delta(&self) -> TimeDelta {
        to_delta(self.seek_context.min(self.window_size))
    }
}

/// Convert a wall-clock duration, saturating instead of failing.
#[must_use]
pub fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Convert signed seconds into a delta, saturating at the representable range.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn seconds_delta(seconds: f64) -> TimeDelta {
    if seconds.is_nan() {
        return TimeDelta::zero();
    }
    let millis = (seconds * 1000.0).round();
    if millis >= TimeDelta::MAX.num_milliseconds() as f64 {
        TimeDelta::MAX
    } else if millis <= TimeDelta::MIN.num_milliseconds() as f64 {
        TimeDelta::MIN
    } else {
        TimeDelta::milliseconds(millis as i64)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0.01, 0.1 ; "below floor")]
    #[test_case(0.1, 0.1 ; "at floor")]
    #[test_case(1.5, 1.5 ; "in range")]
    #[test_case(5.0, 5.0 ; "at ceiling")]
    #[test_case(100.0, 5.0 ; "above ceiling")]
    #[test_case(f64::INFINITY, 5.0 ; "infinite")]
    #[test_case(-3.0, 0.1 ; "negative")]
    fn speed_is_clamped(requested: f64, expected: f64) {
        assert_eq!(clamp_speed(requested), expected);
    }

    #[test]
    fn nan_speed_is_default() {
        assert_eq!(clamp_speed(f64::NAN), DEFAULT_SPEED);
    }

    #[test]
    fn defaults() {
        let settings = ReplaySettings::default();
        assert_eq!(settings.window_delta(), TimeDelta::minutes(5));
        assert_eq!(settings.seek_context_delta(), TimeDelta::seconds(30));
        assert_eq!(settings.pause_poll, Duration::from_millis(500));
        assert_eq!(settings.prefetch_threshold, 0.8);
    }

    #[test]
    fn seek_context_never_exceeds_window() {
        let settings = ReplaySettings {
            window_size: Duration::from_secs(15),
            ..ReplaySettings::default()
        };
        assert_eq!(settings.seek_context_delta(), TimeDelta::seconds(15));
    }

    #[test]
    fn seconds_delta_saturates() {
        assert_eq!(seconds_delta(1.5), TimeDelta::milliseconds(1500));
        assert_eq!(seconds_delta(-2.0), TimeDelta::seconds(-2));
        assert_eq!(seconds_delta(f64::MAX), TimeDelta::MAX);
        assert_eq!(seconds_delta(f64::MIN), TimeDelta::MIN);
    }
}
