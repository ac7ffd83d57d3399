#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Error summaries of a prediction table: overall, per zone, and per
//! (day of week, hour) segment.

use serde::{Deserialize, Serialize};

/// Field names of the per-zone error table, in column order.
pub const ZONE_ERROR_FIELDS: [&str; 9] = [
    "zone_id",
    "borough",
    "zone_name",
    "n",
    "mae",
    "rmse",
    "avg_actual",
    "p95_actual",
    "mae_as_fraction_of_avg",
];

/// Field names of the per-segment error table, in column order.
pub const SEGMENT_ERROR_FIELDS: [&str; 5] = ["day_of_week", "hour", "n", "mae", "rmse"];

/// Count, MAE, and RMSE over a set of predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    /// Predictions scored.
    pub n: u64,
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
}

/// Errors of one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneErrorSummary {
    /// Origin zone id.
    pub zone_id: u32,
    /// Borough of the zone, if known.
    pub borough: Option<String>,
    /// Display name of the zone, if known.
    pub zone_name: Option<String>,
    /// Predictions scored.
    pub n: u64,
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean observed pickups.
    pub avg_actual: f64,
    /// 95th percentile of observed pickups.
    pub p95_actual: f64,
    /// `mae / avg_actual`; infinite when the zone had no pickups at all.
    pub mae_as_fraction_of_avg: f64,
}

impl ZoneErrorSummary {
    /// Whether the relative error is a usable number.
    #[must_use]
    pub const fn has_finite_ratio(&self) -> bool {
        self.mae_as_fraction_of_avg.is_finite()
    }
}

/// Errors of one (day of week, hour of day) segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentErrorSummary {
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u8,
    /// Hour of day, 0..=23.
    pub hour: u8,
    /// Predictions scored.
    pub n: u64,
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
}

/// Everything the aggregator derives from a prediction table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Metrics over every scored prediction.
    pub overall: OverallMetrics,
    /// One row per zone, ordered by zone id.
    pub by_zone: Vec<ZoneErrorSummary>,
    /// One row per observed segment, ordered by day then hour.
    pub by_segment: Vec<SegmentErrorSummary>,
    /// Predictions left out because the estimator produced none.
    pub excluded: u64,
}
