//! Timestamp Resolution
//!
//! Recorded session documents carry timestamps in several shapes: RFC 3339
//! strings, naive ISO-8601 strings written by the ingestion service, epoch
//! numbers, and Mongo extended JSON (`{"$date": ...}`). [`Timestamp`] keeps
//! whatever was recorded and resolves it to a canonical UTC instant.
//!
//! Resolution is lenient: a value that cannot be parsed resolves to the
//! current time of the supplied [`Clock`]. This keeps the replay pipeline
//! live at the cost of possible ordering anomalies for malformed samples.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Naive layouts accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Epoch numbers above this magnitude are milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

// =============================================================================
// Clock
// =============================================================================

/// Source of "now" for lenient timestamp resolution.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Create a clock that always reports `at`.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// A recorded timestamp in whatever shape the store produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    /// A value that parsed to a concrete instant.
    Instant(DateTime<Utc>),
    /// A value that could not be parsed, kept verbatim.
    Malformed(String),
}

impl Timestamp {
    /// Wrap an already-resolved instant.
    #[must_use]
    pub const fn at(instant: DateTime<Utc>) -> Self {
        Self::Instant(instant)
    }

    /// Parse a textual timestamp.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        parse_text(raw).map_or_else(|| Self::Malformed(raw.to_string()), Self::Instant)
    }

    /// Interpret an arbitrary JSON value as a timestamp.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(raw) => Self::parse(raw),
            Value::Number(number) => number
                .as_f64()
                .and_then(parse_epoch)
                .map_or_else(|| Self::Malformed(number.to_string()), Self::Instant),
            Value::Object(map) => match map.get("$date") {
                Some(inner) => parse_extended_date(inner)
                    .map_or_else(|| Self::Malformed(value.to_string()), Self::Instant),
                None => Self::Malformed(value.to_string()),
            },
            other => Self::Malformed(other.to_string()),
        }
    }

    /// The parsed instant, if the value was well-formed.
    #[must_use]
    pub const fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Instant(instant) => Some(*instant),
            Self::Malformed(_) => None,
        }
    }

    /// Whether the recorded value parsed cleanly.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        matches!(self, Self::Instant(_))
    }

    /// Resolve to an instant, falling back to `clock.now()` when malformed.
    #[must_use]
    pub fn resolve(&self, clock: &dyn Clock) -> DateTime<Utc> {
        match self {
            Self::Instant(instant) => *instant,
            Self::Malformed(raw) => {
                tracing::trace!(raw = %raw, "Malformed timestamp resolved to now");
                clock.now()
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant(instant) => {
                f.write_str(&instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Malformed(raw) => f.write_str(raw),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::Instant(instant)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
}

#[allow(clippy::cast_possible_truncation)]
fn parse_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    if value.abs() > EPOCH_MILLIS_THRESHOLD {
        return DateTime::from_timestamp_millis(value.round() as i64);
    }
    let secs = value.floor();
    let nanos = ((value - secs) * 1e9).round().clamp(0.0, 999_999_999.0);
    #[allow(clippy::cast_sign_loss)]
    DateTime::from_timestamp(secs as i64, nanos as u32)
}

fn parse_extended_date(inner: &Value) -> Option<DateTime<Utc>> {
    match inner {
        Value::String(raw) => parse_text(raw),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => map
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|millis| millis.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
