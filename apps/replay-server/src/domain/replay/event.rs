//! Replay events and the topics they are published on.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::{
    Attitude, KillRecord, Position, SoldierMeta, SoldierTrack, StatRecord, Team,
};

// =============================================================================
// Channel
// =============================================================================

/// Subscriber-facing topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Soldier movement.
    Raw,
    /// Kill feed.
    KillFeed,
    /// Soldier stats.
    Stats,
}

impl Channel {
    /// Every channel, in dispatch order.
    pub const ALL: [Self; 3] = [Self::Raw, Self::KillFeed, Self::Stats];

    /// Topic name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::KillFeed => "killfeed",
            Self::Stats => "stats",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Events
// =============================================================================

/// A single replayable event, serialized exactly as subscribers receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReplayEvent {
    /// Position and orientation tick.
    #[serde(rename = "soldier_movement")]
    SoldierMovement(MovementEvent),
    /// Confirmed kill.
    #[serde(rename = "kill_feed")]
    KillFeed(KillFeedEvent),
    /// Cumulative soldier counters.
    #[serde(rename = "stats")]
    SoldierStats(StatsEvent),
}

/// Movement payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEvent {
    /// Soldier identifier.
    pub soldier_id: String,
    /// Team affiliation.
    pub team: Team,
    /// Radio call sign.
    pub call_sign: String,
    /// Position.
    pub position: Position,
    /// Orientation.
    pub orientation: Attitude,
    /// Recorded instant.
    #[serde(rename = "db_timestamp")]
    pub instant: DateTime<Utc>,
}

/// Kill feed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillFeedEvent {
    /// Attacking soldier.
    pub attacker_id: String,
    /// Attacker call sign.
    pub attacker_call_sign: String,
    /// Killed soldier.
    pub victim_id: String,
    /// Victim call sign.
    pub victim_call_sign: String,
    /// Distance in meters.
    pub distance_to_victim: Option<f64>,
    /// Recorded instant.
    #[serde(rename = "db_timestamp")]
    pub instant: DateTime<Utc>,
}

/// Stats payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsEvent {
    /// Soldier identifier.
    pub soldier_id: String,
    /// Team affiliation.
    pub team: Team,
    /// Radio call sign.
    pub call_sign: String,
    /// Health at the sample instant.
    pub health: f64,
    /// Confirmed kills.
    pub kills: u32,
    /// Rounds fired.
    pub bullets_fired: u32,
    /// Recorded instant.
    #[serde(rename = "db_timestamp")]
    pub instant: DateTime<Utc>,
}

impl ReplayEvent {
    /// Recorded instant of the event.
    #[must_use]
    pub const fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::SoldierMovement(event) => event.instant,
            Self::KillFeed(event) => event.instant,
            Self::SoldierStats(event) => event.instant,
        }
    }

    /// Channel the event is published on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::SoldierMovement(_) => Channel::Raw,
            Self::KillFeed(_) => Channel::KillFeed,
            Self::SoldierStats(_) => Channel::Stats,
        }
    }

    /// Soldier the event belongs to; kills belong to nobody in particular.
    #[must_use]
    pub fn soldier_id(&self) -> Option<&str> {
        match self {
            Self::SoldierMovement(event) => Some(&event.soldier_id),
            Self::SoldierStats(event) => Some(&event.soldier_id),
            Self::KillFeed(_) => None,
        }
    }

    /// Flatten per-soldier tracks into movement events.
    pub fn from_tracks(tracks: Vec<SoldierTrack>) -> impl Iterator<Item = Self> {
        tracks.into_iter().flat_map(|track| {
            let SoldierTrack { soldier, samples } = track;
            samples.into_iter().map(move |sample| {
                let SoldierMeta {
                    soldier_id,
                    team,
                    call_sign,
                } = soldier.clone();
                Self::SoldierMovement(MovementEvent {
                    soldier_id,
                    team,
                    call_sign,
                    position: sample.position,
                    orientation: sample.attitude,
                    instant: sample.instant,
                })
            })
        })
    }
}

impl From<KillRecord> for ReplayEvent {
    fn from(kill: KillRecord) -> Self {
        Self::KillFeed(KillFeedEvent {
            attacker_id: kill.attacker_id,
            attacker_call_sign: kill.attacker_call_sign,
            victim_id: kill.victim_id,
            victim_call_sign: kill.victim_call_sign,
            distance_to_victim: kill.distance,
            instant: kill.instant,
        })
    }
}

impl From<StatRecord> for ReplayEvent {
    fn from(stat: StatRecord) -> Self {
        Self::SoldierStats(StatsEvent {
            soldier_id: stat.soldier.soldier_id,
            team: stat.soldier.team,
            call_sign: stat.soldier.call_sign,
            health: stat.health,
            kills: stat.kills,
            bullets_fired: stat.bullets_fired,
            instant: stat.instant,
        })
    }
}
