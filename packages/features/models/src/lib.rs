#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature panel types.
//!
//! A [`FeatureRecord`] is a [`DemandRecord`](taxi_demand_grid_models::DemandRecord)
//! extended with calendar, lag, and rolling-mean features. Every lag and
//! rolling value of a record at hour `T` is derived only from the same
//! zone's counts strictly before `T`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use taxi_demand_grid_models::{PanelRow, timestamp};

/// Lag depths, in positions of a zone's own sequence.
pub const LAGS: [usize; 4] = [1, 2, 24, 168];

/// Trailing rolling-mean window sizes.
pub const ROLLING_WINDOWS: [usize; 4] = [3, 6, 24, 168];

/// Field names of a persisted feature panel, in column order.
pub const FEATURE_FIELDS: [&str; 19] = [
    "zone_id",
    "hour_timestamp",
    "pickup_count",
    "borough",
    "zone_name",
    "hour",
    "day_of_week",
    "is_weekend",
    "hour_of_week",
    "lag_1",
    "lag_2",
    "lag_24",
    "lag_168",
    "roll_mean_3",
    "roll_mean_6",
    "roll_mean_24",
    "roll_mean_168",
    "has_lag_168",
    "has_roll_168",
];

/// Model input columns, in the order a forecast model sees them.
/// `zone_id` is categorical; the rest are numeric.
pub const MODEL_FEATURES: [&str; 15] = [
    "zone_id",
    "hour",
    "day_of_week",
    "is_weekend",
    "hour_of_week",
    "lag_1",
    "lag_2",
    "lag_24",
    "lag_168",
    "roll_mean_3",
    "roll_mean_6",
    "roll_mean_24",
    "roll_mean_168",
    "has_lag_168",
    "has_roll_168",
];

/// One admitted row of the feature panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Origin zone id.
    pub zone_id: u32,
    /// Start of the hour bucket.
    #[serde(with = "timestamp")]
    pub hour_timestamp: NaiveDateTime,
    /// Observed pickups in the hour; the forecast target.
    pub pickup_count: u32,
    /// Borough of the zone, if known.
    pub borough: Option<String>,
    /// Display name of the zone, if known.
    pub zone_name: Option<String>,
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Day of week, 0 = Monday.
    pub day_of_week: u8,
    /// Saturday or Sunday.
    pub is_weekend: bool,
    /// `day_of_week * 24 + hour`.
    pub hour_of_week: u8,
    /// Count one position earlier.
    pub lag_1: Option<f64>,
    /// Count two positions earlier.
    pub lag_2: Option<f64>,
    /// Count 24 positions earlier.
    pub lag_24: Option<f64>,
    /// Count 168 positions earlier.
    pub lag_168: Option<f64>,
    /// Mean of the previous 3 counts.
    pub roll_mean_3: Option<f64>,
    /// Mean of the previous 6 counts.
    pub roll_mean_6: Option<f64>,
    /// Mean of the previous 24 counts.
    pub roll_mean_24: Option<f64>,
    /// Mean of the previous 168 counts.
    pub roll_mean_168: Option<f64>,
    /// Whether `lag_168` is present.
    pub has_lag_168: bool,
    /// Whether `roll_mean_168` is present.
    pub has_roll_168: bool,
}

impl FeatureRecord {
    /// Values of the numeric model columns, in [`MODEL_FEATURES`] order
    /// after `zone_id`. Missing values are `NaN`.
    #[must_use]
    pub fn numeric_features(&self) -> [f64; 14] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let opt = |v: Option<f64>| v.unwrap_or(f64::NAN);
        [
            f64::from(self.hour),
            f64::from(self.day_of_week),
            flag(self.is_weekend),
            f64::from(self.hour_of_week),
            opt(self.lag_1),
            opt(self.lag_2),
            opt(self.lag_24),
            opt(self.lag_168),
            opt(self.roll_mean_3),
            opt(self.roll_mean_6),
            opt(self.roll_mean_24),
            opt(self.roll_mean_168),
            flag(self.has_lag_168),
            flag(self.has_roll_168),
        ]
    }
}

impl PanelRow for FeatureRecord {
    fn zone_id(&self) -> u32 {
        self.zone_id
    }

    fn hour_timestamp(&self) -> NaiveDateTime {
        self.hour_timestamp
    }

    fn pickup_count(&self) -> u32 {
        self.pickup_count
    }
}

/// Observability summary of a feature engineering run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    /// Panel rows received.
    pub rows_in: u64,
    /// Feature rows admitted.
    pub rows_out: u64,
    /// Zones in the input panel.
    pub zones_in: u64,
    /// Zones with at least one admitted row.
    pub zones_out: u64,
    /// Zones whose hourly sequence skips at least one hour, making
    /// positional lags differ from wall-clock lags.
    pub gapped_zones: u64,
}

impl FeatureSummary {
    /// Rows dropped for insufficient history.
    #[must_use]
    pub const fn rows_dropped(&self) -> u64 {
        self.rows_in - self.rows_out
    }

    /// Fraction of panel rows admitted, or `None` for an empty panel.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn retention_ratio(&self) -> Option<f64> {
        if self.rows_in == 0 {
            None
        } else {
            Some(self.rows_out as f64 / self.rows_in as f64)
        }
    }
}
