//! Recorded Session Documents
//!
//! Typed records for one recorded training session as persisted by the
//! ingestion service, plus inclusive time-range queries over a session
//! snapshot. Conversion from the loosely-shaped stored document happens
//! once, at deserialization; everything downstream works on these types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::time::{Clock, Timestamp};

/// Full health before any damage threshold is reached.
pub const FULL_HEALTH: f64 = 100.0;

// =============================================================================
// Errors
// =============================================================================

/// Structural defects that make a session unreplayable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session lists no participating soldiers.
    #[error("session has no participating soldiers")]
    NoParticipants,

    /// A location sample carries a timestamp that cannot be parsed.
    #[error("soldier {soldier_id} location #{index} has malformed timestamp {raw:?}")]
    MalformedLocationTimestamp {
        /// Soldier owning the sample.
        soldier_id: String,
        /// Index of the sample in the soldier's location track.
        index: usize,
        /// Raw recorded value.
        raw: String,
    },
}

// =============================================================================
// Team
// =============================================================================

/// Team affiliation of a soldier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// Red team.
    Red,
    /// Blue team.
    Blue,
    /// Not allocated to a team.
    #[default]
    Unassigned,
}

impl Team {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Unassigned => "unassigned",
        }
    }
}

impl From<&str> for Team {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "red" => Self::Red,
            "blue" => Self::Blue,
            _ => Self::Unassigned,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Team {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::Unassigned, |team| Self::from(team.as_str())))
    }
}

/// Identifiers are recorded as either strings or integers.
fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => id,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// =============================================================================
// Document Records
// =============================================================================

/// A recorded training session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    #[serde(deserialize_with = "flexible_id")]
    pub session_id: String,
    /// Recorded session start, if any.
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    /// Recorded session end, if any.
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    /// Participating soldiers in allocation order.
    #[serde(default)]
    pub participated_soldiers: Vec<Soldier>,
    /// Kill events in recording order.
    #[serde(default)]
    pub events: Vec<KillEvent>,
    /// Team totals history.
    #[serde(default)]
    pub team_stats_history: Vec<TeamStatsSnapshot>,
    /// Squad/team allocation, passed through untouched.
    #[serde(default)]
    pub allocation: Value,
}

/// One participating soldier and their recorded tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Soldier {
    /// Soldier identifier.
    #[serde(deserialize_with = "flexible_id")]
    pub soldier_id: String,
    /// Radio call sign.
    #[serde(default)]
    pub call_sign: String,
    /// Team affiliation.
    #[serde(default)]
    pub team: Team,
    /// Squad number.
    #[serde(default)]
    pub squad: Option<u32>,
    /// Position samples, time-ordered.
    #[serde(default)]
    pub location: Vec<Location>,
    /// Orientation samples, index-paired with `location`.
    #[serde(default)]
    pub orientation: Vec<Orientation>,
    /// Stat samples, time-ordered.
    #[serde(default)]
    pub stats: Vec<StatSample>,
    /// Instant of death, if killed.
    #[serde(default)]
    pub death_time: Option<Timestamp>,
    /// Damage thresholds reached.
    #[serde(default)]
    pub damage: DamageLadder,
}

/// Geographic position sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees, `None` when the sample omits it.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in degrees, `None` when the sample omits it.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Sample instant.
    pub timestamp: Timestamp,
}

/// Head/body orientation sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orientation {
    /// Roll in degrees.
    #[serde(default)]
    pub roll: f64,
    /// Pitch in degrees.
    #[serde(default)]
    pub pitch: f64,
    /// Yaw in degrees.
    #[serde(default)]
    pub yaw: f64,
    /// Sample instant.
    pub timestamp: Timestamp,
}

/// Cumulative per-soldier counters at an instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSample {
    /// Confirmed kills so far.
    #[serde(default)]
    pub kill_count: u32,
    /// Rounds fired so far.
    #[serde(default)]
    pub bullets_fired: u32,
    /// Health, when the recorder captured it.
    #[serde(default)]
    pub health: Option<f64>,
    /// Sample instant.
    pub timestamp: Timestamp,
}

/// A confirmed kill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillEvent {
    /// Attacking soldier.
    #[serde(deserialize_with = "flexible_id")]
    pub attacker_id: String,
    /// Attacker call sign.
    #[serde(default)]
    pub attacker_call_sign: String,
    /// Killed soldier.
    #[serde(deserialize_with = "flexible_id")]
    pub victim_id: String,
    /// Victim call sign.
    #[serde(default)]
    pub victim_call_sign: String,
    /// Distance between attacker and victim in meters.
    #[serde(default, alias = "distance_to_victim (in meters)")]
    pub distance_to_victim: Option<f64>,
    /// Kill instant.
    pub timestamp: Timestamp,
}

/// Team totals at an instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStatsSnapshot {
    /// Red team totals.
    #[serde(default)]
    pub team_red: TeamTotals,
    /// Blue team totals.
    #[serde(default)]
    pub team_blue: TeamTotals,
}

/// Per-team counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamTotals {
    /// Soldiers killed by this team.
    #[serde(default)]
    pub total_killed: u32,
    /// Rounds fired by this team.
    #[serde(default)]
    pub bullets_fired: u32,
    /// Instant the totals were recorded.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Damage thresholds reached, keyed by percentage lost.
///
/// Stored as a map of threshold string to instant (`{"25": ..., "50": ...}`).
/// Keys that are not percentages are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DamageLadder(BTreeMap<u8, Timestamp>);

impl DamageLadder {
    /// Build a ladder from `(threshold, instant)` pairs.
    #[must_use]
    pub fn from_steps(steps: impl IntoIterator<Item = (u8, Timestamp)>) -> Self {
        Self(steps.into_iter().collect())
    }

    /// Highest threshold reached at or before `at`.
    #[must_use]
    pub fn damage_at(&self, at: DateTime<Utc>, clock: &dyn Clock) -> u8 {
        self.0
            .iter()
            .filter(|(_, reached)| reached.resolve(clock) <= at)
            .map(|(threshold, _)| *threshold)
            .max()
            .unwrap_or(0)
    }
}

impl<'de> Deserialize<'de> for DamageLadder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<BTreeMap<String, Timestamp>>::deserialize(deserializer)?;
        Ok(Self(
            raw.unwrap_or_default()
                .into_iter()
                .filter_map(|(key, reached)| {
                    key.trim()
                        .parse::<u8>()
                        .ok()
                        .filter(|threshold| *threshold <= 100)
                        .map(|threshold| (threshold, reached))
                })
                .collect(),
        ))
    }
}

// =============================================================================
// Query Results
// =============================================================================

/// Identity fields copied onto every soldier-scoped event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldierMeta {
    /// Soldier identifier.
    pub soldier_id: String,
    /// Team affiliation.
    pub team: Team,
    /// Radio call sign.
    pub call_sign: String,
}

/// Latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    pub longitude: Option<f64>,
}

/// Roll/pitch/yaw triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    /// Roll in degrees.
    pub roll: f64,
    /// Pitch in degrees.
    pub pitch: f64,
    /// Yaw in degrees.
    pub yaw: f64,
}

/// One paired location/orientation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSample {
    /// Instant of the location sample.
    pub instant: DateTime<Utc>,
    /// Position.
    pub position: Position,
    /// Orientation paired by index.
    pub attitude: Attitude,
}

/// A soldier's movement samples inside a time range.
#[derive(Debug, Clone, PartialEq)]
pub struct SoldierTrack {
    /// Soldier identity.
    pub soldier: SoldierMeta,
    /// Samples in recording order.
    pub samples: Vec<MovementSample>,
}

/// A kill with its instant resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct KillRecord {
    /// Kill instant.
    pub instant: DateTime<Utc>,
    /// Attacking soldier.
    pub attacker_id: String,
    /// Attacker call sign.
    pub attacker_call_sign: String,
    /// Killed soldier.
    pub victim_id: String,
    /// Victim call sign.
    pub victim_call_sign: String,
    /// Distance in meters, if recorded.
    pub distance: Option<f64>,
}

/// A stat sample with its instant and health resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    /// Soldier identity.
    pub soldier: SoldierMeta,
    /// Sample instant.
    pub instant: DateTime<Utc>,
    /// Health at the sample instant.
    pub health: f64,
    /// Confirmed kills.
    pub kills: u32,
    /// Rounds fired.
    pub bullets_fired: u32,
}

// =============================================================================
// Session Queries
// =============================================================================

impl Session {
    /// Reject sessions that cannot be replayed.
    ///
    /// Location timestamps are checked strictly because they drive movement
    /// ordering. Every other timestamp is resolved leniently at query time.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for an empty participant list or an
    /// unparseable location timestamp.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.participated_soldiers.is_empty() {
            return Err(SessionError::NoParticipants);
        }
        for soldier in &self.participated_soldiers {
            for (index, location) in soldier.location.iter().enumerate() {
                if let Timestamp::Malformed(raw) = &location.timestamp {
                    return Err(SessionError::MalformedLocationTimestamp {
                        soldier_id: soldier.soldier_id.clone(),
                        index,
                        raw: raw.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Earliest and latest instants across every location, stat sample and
    /// kill. An empty session collapses to `(now, now)`.
    #[must_use]
    pub fn time_bounds(&self, clock: &dyn Clock) -> (DateTime<Utc>, DateTime<Utc>) {
        let soldier_instants = self.participated_soldiers.iter().flat_map(|soldier| {
            soldier
                .location
                .iter()
                .map(|location| &location.timestamp)
                .chain(soldier.stats.iter().map(|stat| &stat.timestamp))
        });
        let kill_instants = self.events.iter().map(|kill| &kill.timestamp);

        let bounds = soldier_instants
            .chain(kill_instants)
            .map(|ts| ts.resolve(clock))
            .fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, instant| {
                Some(acc.map_or((instant, instant), |(lo, hi)| {
                    (lo.min(instant), hi.max(instant))
                }))
            });

        bounds.unwrap_or_else(|| {
            let now = clock.now();
            (now, now)
        })
    }

    /// Movement samples with `start <= instant <= end`, one track per soldier
    /// that has any. Locations and orientations are paired by index; a
    /// trailing sample without a partner is dropped.
    #[must_use]
    pub fn movement_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        clock: &dyn Clock,
    ) -> Vec<SoldierTrack> {
        self.participated_soldiers
            .iter()
            .filter_map(|soldier| {
                let samples: Vec<MovementSample> = soldier
                    .location
                    .iter()
                    .zip(&soldier.orientation)
                    .filter_map(|(location, orientation)| {
                        let instant = location.timestamp.resolve(clock);
                        (start <= instant && instant <= end).then_some(MovementSample {
                            instant,
                            position: Position {
                                latitude: location.latitude,
                                longitude: location.longitude,
                            },
                            attitude: Attitude {
                                roll: orientation.roll,
                                pitch: orientation.pitch,
                                yaw: orientation.yaw,
                            },
                        })
                    })
                    .collect();
                (!samples.is_empty()).then(|| SoldierTrack {
                    soldier: soldier.meta(),
                    samples,
                })
            })
            .collect()
    }

    /// Kills with `start <= instant <= end`, in recording order.
    #[must_use]
    pub fn kills_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        clock: &dyn Clock,
    ) -> Vec<KillRecord> {
        self.events
            .iter()
            .filter_map(|kill| {
                let instant = kill.timestamp.resolve(clock);
                (start <= instant && instant <= end).then(|| KillRecord {
                    instant,
                    attacker_id: kill.attacker_id.clone(),
                    attacker_call_sign: kill.attacker_call_sign.clone(),
                    victim_id: kill.victim_id.clone(),
                    victim_call_sign: kill.victim_call_sign.clone(),
                    distance: kill.distance_to_victim,
                })
            })
            .collect()
    }

    /// Stat samples with `start <= instant <= end`, soldier by soldier.
    #[must_use]
    pub fn stats_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        clock: &dyn Clock,
    ) -> Vec<StatRecord> {
        self.participated_soldiers
            .iter()
            .flat_map(|soldier| {
                let meta = soldier.meta();
                soldier.stats.iter().filter_map(move |stat| {
                    let instant = stat.timestamp.resolve(clock);
                    (start <= instant && instant <= end).then(|| StatRecord {
                        soldier: meta.clone(),
                        instant,
                        health: stat
                            .health
                            .unwrap_or_else(|| soldier.health_at(instant, clock)),
                        kills: stat.kill_count,
                        bullets_fired: stat.bullets_fired,
                    })
                })
            })
            .collect()
    }
}

impl Soldier {
    /// Identity fields.
    #[must_use]
    pub fn meta(&self) -> SoldierMeta {
        SoldierMeta {
            soldier_id: self.soldier_id.clone(),
            team: self.team,
            call_sign: self.call_sign.clone(),
        }
    }

    /// Health derived from the damage ladder, zero once dead.
    #[must_use]
    pub fn health_at(&self, at: DateTime<Utc>, clock: &dyn Clock) -> f64 {
        if self
            .death_time
            .as_ref()
            .is_some_and(|death| death.resolve(clock) <= at)
        {
            return 0.0;
        }
        (FULL_HEALTH - f64::from(self.damage.damage_at(at, clock))).max(0.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::domain::time::FixedClock;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 6, 11, 0, 0).unwrap()
    }

    fn at(secs: i64) -> String {
        (base() + Duration::seconds(secs)).to_rfc3339()
    }

    fn clock() -> FixedClock {
        FixedClock::new(base() + Duration::hours(5))
    }

    fn sample_session() -> Session {
        serde_json::from_value(json!({
            "session_id": 7,
            "participated_soldiers": [
                {
                    "soldier_id": "S1",
                    "call_sign": "Alpha1",
                    "team": "Red",
                    "squad": 1,
                    "location": [
                        { "latitude": 1.0, "longitude": 2.0, "timestamp": at(0) },
                        { "latitude": 1.1, "longitude": 2.1, "timestamp": at(10) },
                        { "latitude": 1.2, "longitude": 2.2, "timestamp": at(20) }
                    ],
                    "orientation": [
                        { "roll": 0.0, "pitch": 1.0, "yaw": 90.0, "timestamp": at(0) },
                        { "roll": 0.0, "pitch": 1.0, "yaw": 91.0, "timestamp": at(10) }
                    ],
                    "stats": [
                        { "kill_count": 0, "bullets_fired": 3, "timestamp": at(5) },
                        { "kill_count": 1, "bullets_fired": 9, "health": 40.0, "timestamp": at(30) }
                    ],
                    "damage": { "25": at(4), "bogus": at(1), "50": at(40) }
                },
                {
                    "soldier_id": 42,
                    "call_sign": "Bravo2",
                    "team": "blue",
                    "location": [],
                    "death_time": at(25),
                    "stats": [
                        { "kill_count": 0, "bullets_fired": 0, "timestamp": at(26) }
                    ]
                }
            ],
            "events": [
                {
                    "attacker_id": "S1",
                    "attacker_call_sign": "Alpha1",
                    "victim_id": 42,
                    "victim_call_sign": "Bravo2",
                    "distance_to_victim (in meters)": 87.5,
                    "timestamp": at(25)
                }
            ],
            "team_stats_history": [
                { "team_red": { "total_killed": 1, "bullets_fired": 9, "timestamp": at(25) } }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn decodes_document_shape() {
        let session = sample_session();
        assert_eq!(session.session_id, "7");
        assert_eq!(session.participated_soldiers[0].team, Team::Red);
        assert_eq!(session.participated_soldiers[1].soldier_id, "42");
        assert_eq!(session.participated_soldiers[1].team, Team::Blue);
        assert_eq!(session.events[0].distance_to_victim, Some(87.5));
        assert_eq!(session.team_stats_history[0].team_red.total_killed, 1);
        assert_eq!(session.team_stats_history[0].team_blue.total_killed, 0);
        assert!(session.allocation.is_null());
    }

    #[test]
    fn unknown_team_is_unassigned() {
        assert_eq!(Team::from("green"), Team::Unassigned);
        let soldier: Soldier = serde_json::from_value(json!({ "soldier_id": "x", "team": null })).unwrap();
        assert_eq!(soldier.team, Team::Unassigned);
    }

    #[test]
    fn validate_requires_participants() {
        let session: Session = serde_json::from_value(json!({ "session_id": "empty" })).unwrap();
        assert_eq!(session.validate(), Err(SessionError::NoParticipants));
    }

    #[test]
    fn validate_rejects_malformed_location() {
        let mut session = sample_session();
        session.participated_soldiers[0].location[1].timestamp = Timestamp::parse("garbage");
        assert_eq!(
            session.validate(),
            Err(SessionError::MalformedLocationTimestamp {
                soldier_id: "S1".to_string(),
                index: 1,
                raw: "garbage".to_string(),
            })
        );
    }

    #[test]
    fn validate_tolerates_malformed_stats() {
        let mut session = sample_session();
        session.participated_soldiers[0].stats[0].timestamp = Timestamp::parse("garbage");
        assert!(session.validate().is_ok());
    }

    #[test]
    fn bounds_span_locations_stats_and_kills() {
        let (start, end) = sample_session().time_bounds(&clock());
        assert_eq!(start, base());
        assert_eq!(end, base() + Duration::seconds(30));
    }

    #[test]
    fn bounds_of_empty_session_are_now() {
        let session: Session = serde_json::from_value(json!({ "session_id": "empty" })).unwrap();
        let clock = clock();
        assert_eq!(session.time_bounds(&clock), (clock.now(), clock.now()));
    }

    #[test]
    fn movement_pairs_by_index_and_filters_inclusively() {
        let session = sample_session();
        let tracks = session.movement_between(base(), base() + Duration::seconds(10), &clock());

        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track.soldier.soldier_id, "S1");
        assert_eq!(track.samples.len(), 2);
        assert_eq!(track.samples[1].instant, base() + Duration::seconds(10));
        assert_eq!(track.samples[1].attitude.yaw, 91.0);
    }

    #[test]
    fn missing_coordinates_pass_through_as_null() {
        let session: Session = serde_json::from_value(json!({
            "session_id": "gps",
            "participated_soldiers": [{
                "soldier_id": "S1",
                "location": [{ "latitude": 1.0, "timestamp": at(0) }],
                "orientation": [{ "roll": 0.0, "pitch": 0.0, "yaw": 5.0, "timestamp": at(0) }]
            }]
        }))
        .unwrap();

        let tracks = session.movement_between(base(), base(), &clock());
        let position = tracks[0].samples[0].position;
        assert_eq!(position.latitude, Some(1.0));
        assert_eq!(position.longitude, None);
        assert_eq!(
            serde_json::to_value(position).unwrap(),
            json!({ "latitude": 1.0, "longitude": null })
        );
    }

    #[test]
    fn movement_drops_unpaired_location() {
        let session = sample_session();
        let tracks = session.movement_between(base(), base() + Duration::seconds(60), &clock());
        assert_eq!(tracks[0].samples.len(), 2);
    }

    #[test]
    fn kills_filter_inclusively() {
        let session = sample_session();
        let instant = base() + Duration::seconds(25);
        assert_eq!(session.kills_between(instant, instant, &clock()).len(), 1);
        assert!(session.kills_between(base(), instant - Duration::milliseconds(1), &clock()).is_empty());
    }

    #[test]
    fn stats_derive_health_from_ladder_and_death() {
        let session = sample_session();
        let stats = session.stats_between(base(), base() + Duration::seconds(60), &clock());

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].health, 75.0);
        assert_eq!(stats[0].bullets_fired, 3);
        assert_eq!(stats[1].health, 40.0);
        assert_eq!(stats[1].kills, 1);
        assert_eq!(stats[2].soldier.soldier_id, "42");
        assert_eq!(stats[2].health, 0.0);
    }

    #[test]
    fn ladder_ignores_non_numeric_keys() {
        let session = sample_session();
        let ladder = &session.participated_soldiers[0].damage;
        assert_eq!(ladder.damage_at(base() + Duration::seconds(3), &clock()), 0);
        assert_eq!(ladder.damage_at(base() + Duration::seconds(60), &clock()), 50);
    }
}
