//! Replay position and per-channel watermarks.

use chrono::{DateTime, Utc};

use crate::domain::replay::event::Channel;

/// Last-broadcast instant per channel.
///
/// An event is admitted on a channel only if it is not older than that
/// channel's watermark, which suppresses stale events left behind by a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    raw: DateTime<Utc>,
    killfeed: DateTime<Utc>,
    stats: DateTime<Utc>,
}

impl Watermarks {
    /// All channels at `at`.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self {
            raw: at,
            killfeed: at,
            stats: at,
        }
    }

    /// Watermark of `channel`.
    #[must_use]
    pub const fn get(&self, channel: Channel) -> DateTime<Utc> {
        match channel {
            Channel::Raw => self.raw,
            Channel::KillFeed => self.killfeed,
            Channel::Stats => self.stats,
        }
    }

    /// Whether an event at `instant` may be broadcast on `channel`.
    #[must_use]
    pub fn admits(&self, channel: Channel, instant: DateTime<Utc>) -> bool {
        instant >= self.get(channel)
    }

    /// Record a broadcast on `channel`.
    pub const fn set(&mut self, channel: Channel, instant: DateTime<Utc>) {
        match channel {
            Channel::Raw => self.raw = instant,
            Channel::KillFeed => self.killfeed = instant,
            Channel::Stats => self.stats = instant,
        }
    }

    /// Move every channel to `at`.
    pub const fn reset_all(&mut self, at: DateTime<Utc>) {
        *self = Self::new(at);
    }
}

/// Current replay position within the active window.
///
/// `index` always denotes the next event to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Instant of the most recently processed event, or the seek target.
    pub current_instant: DateTime<Utc>,
    /// Next event to process.
    pub current_index: usize,
    /// Per-channel watermarks.
    pub watermarks: Watermarks,
}

impl Cursor {
    /// Cursor at the beginning of a replay.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self {
            current_instant: at,
            current_index: 0,
            watermarks: Watermarks::new(at),
        }
    }

    /// Jump to `target` at `index`, resetting every watermark to `target`.
    pub const fn seek(&mut self, target: DateTime<Utc>, index: usize) {
        self.current_instant = target;
        self.current_index = index;
        self.watermarks.reset_all(target);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 6, 11, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn watermark_admits_equal_and_later() {
        let mut marks = Watermarks::new(at(10));
        assert!(marks.admits(Channel::Raw, at(10)));
        assert!(!marks.admits(Channel::Raw, at(9)));

        marks.set(Channel::Raw, at(20));
        assert!(!marks.admits(Channel::Raw, at(15)));
        assert!(marks.admits(Channel::Stats, at(15)));
    }

    #[test]
    fn seek_resets_every_channel() {
        let mut cursor = Cursor::new(at(0));
        cursor.watermarks.set(Channel::KillFeed, at(50));
        cursor.current_index = 7;

        cursor.seek(at(30), 2);

        assert_eq!(cursor.current_instant, at(30));
        assert_eq!(cursor.current_index, 2);
        for channel in Channel::ALL {
            assert_eq!(cursor.watermarks.get(channel), at(30));
        }
    }
}
