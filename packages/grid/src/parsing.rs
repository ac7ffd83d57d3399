//! Value coercion for raw trip fields.
//!
//! Every function here returns `None` instead of failing: a value that
//! cannot be coerced becomes a counted drop reason upstream.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M",
];

/// Parses a trip timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the same with a `T` separator, and
/// the US export form `MM/DD/YYYY HH:MM:SS AM`.
#[must_use]
pub fn parse_trip_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// Truncates a timestamp to the start of its hour.
#[must_use]
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN) + TimeDelta::hours(i64::from(ts.hour()))
}

/// Parses a zone id. Float-typed exports such as `"132.0"` are accepted
/// when the value is a whole, non-negative number.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_zone_id(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Ok(id) = s.parse::<u32>() {
        return Some(id);
    }
    let value = s.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Some(value as u32)
    } else {
        None
    }
}

/// Parses a finite numeric value.
#[must_use]
pub fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Trip duration in minutes, including fractional minutes.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_minutes(pickup: NaiveDateTime, dropoff: NaiveDateTime) -> f64 {
    (dropoff - pickup).num_milliseconds() as f64 / 60_000.0
}
