#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Leakage-safe feature engineering over the zone-by-hour demand panel.

pub mod engine;

pub use engine::{FeatureEngine, FeatureSet, is_admissible, zone_features};

use chrono::NaiveDateTime;

/// Errors that can occur while deriving features.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// The panel holds more than one row for a `(zone, hour)`.
    #[error("Duplicate panel row for zone {zone_id} at {hour_timestamp}")]
    DuplicateRow {
        /// Zone of the duplicated row.
        zone_id: u32,
        /// Hour of the duplicated row.
        hour_timestamp: NaiveDateTime,
    },
}
