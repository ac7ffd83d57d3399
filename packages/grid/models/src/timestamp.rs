//! Serde adapter for hour timestamps in persisted panels.
//!
//! Panels are written as `YYYY-MM-DD HH:MM:SS` so that the CSV artifacts
//! read naturally in spreadsheets and match the source data's own format.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serializer};

/// Textual format of a persisted timestamp.
pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Serializes a timestamp using [`FORMAT`].
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(FORMAT))
}

/// Deserializes a timestamp written with [`FORMAT`].
///
/// # Errors
///
/// Returns a deserializer error if the text does not match [`FORMAT`].
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let s = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
}
