//! Window
//!
//! One contiguous, time-sorted slice of a session's events. A window is
//! immutable once assembled; advancing or seeking replaces it wholesale so a
//! reader holding the previous window never observes a partial update.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::replay::event::ReplayEvent;
use crate::domain::session::{KillRecord, SoldierTrack, StatRecord};

/// A sorted batch of events covering `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    events: Vec<ReplayEvent>,
}

impl Window {
    /// Merge query results into a window.
    ///
    /// Movement, kills and stats are concatenated in that order and then
    /// stably sorted by instant, so events sharing an instant keep the
    /// merge order.
    #[must_use]
    pub fn assemble(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tracks: Vec<SoldierTrack>,
        kills: Vec<KillRecord>,
        stats: Vec<StatRecord>,
    ) -> Self {
        let events = ReplayEvent::from_tracks(tracks)
            .chain(kills.into_iter().map(ReplayEvent::from))
            .chain(stats.into_iter().map(ReplayEvent::from))
            .collect();
        Self::from_events(start, end, events)
    }

    /// Build a window from arbitrary events, sorting them stably.
    #[must_use]
    pub fn from_events(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mut events: Vec<ReplayEvent>,
    ) -> Self {
        events.sort_by_key(ReplayEvent::instant);
        Self { start, end, events }
    }

    /// A window with no events.
    #[must_use]
    pub const fn empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            events: Vec::new(),
        }
    }

    /// Window start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Window end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Events in replay order.
    #[must_use]
    pub fn events(&self) -> &[ReplayEvent] {
        &self.events
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the window holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ReplayEvent> {
        self.events.get(index)
    }

    /// Whether `instant` lies inside `[start, end]`.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Lower-bound search: index of the first event with `instant >= target`.
    ///
    /// Clamped to `len - 1` when every event precedes `target`, and `0` for
    /// an empty window. Duplicate instants resolve to the first in order.
    #[must_use]
    pub fn find_index(&self, target: DateTime<Utc>) -> usize {
        if self.events.is_empty() {
            return 0;
        }
        let index = self
            .events
            .partition_point(|event| event.instant() < target);
        index.min(self.events.len() - 1)
    }

    /// Index of the first event strictly after `instant`.
    ///
    /// Contiguous windows share their boundary instant because store
    /// queries are inclusive; this skips what the previous window already
    /// played.
    #[must_use]
    pub fn first_after(&self, instant: DateTime<Utc>) -> usize {
        self.events
            .partition_point(|event| event.instant() <= instant)
    }

    /// Latest movement and stats event per soldier at or before `target`.
    ///
    /// Soldiers are listed in order of first appearance; each contributes
    /// its movement before its stats.
    #[must_use]
    pub fn state_at(&self, target: DateTime<Utc>) -> Vec<ReplayEvent> {
        #[derive(Default)]
        struct Latest {
            movement: Option<usize>,
            stats: Option<usize>,
        }

        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, Latest> = HashMap::new();

        for (index, event) in self.events.iter().enumerate() {
            if event.instant() > target {
                break;
            }
            let Some(soldier_id) = event.soldier_id() else {
                continue;
            };
            let entry = latest.entry(soldier_id).or_insert_with(|| {
                order.push(soldier_id);
                Latest::default()
            });
            match event {
                ReplayEvent::SoldierMovement(_) => entry.movement = Some(index),
                ReplayEvent::SoldierStats(_) => entry.stats = Some(index),
                ReplayEvent::KillFeed(_) => {}
            }
        }

        order
            .iter()
            .filter_map(|soldier_id| latest.get(soldier_id))
            .flat_map(|entry| [entry.movement, entry.stats])
            .flatten()
            .map(|index| self.events[index].clone())
            .collect()
    }
}
