#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types shared by the forecasting stages: how a panel is split, what a
//! prediction looks like, and how the boosted model is parameterized.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use taxi_demand_grid_models::{PanelRow, timestamp};

/// Field names of a persisted prediction table, in column order.
pub const PREDICTION_FIELDS: [&str; 6] = [
    "zone_id",
    "borough",
    "zone_name",
    "hour_timestamp",
    "actual",
    "predicted",
];

// ── Split policy ─────────────────────────────────────────────────────────

/// How a time-ordered panel is cut into train and test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// The first `fraction` of rows (by hour) train; the rest test. Rows
    /// sharing an hour may land on both sides.
    Fraction {
        /// Share of rows used for training, strictly between 0 and 1.
        fraction: f64,
    },
    /// Rows at or after `max(hour) - hours` test; everything earlier
    /// trains. No hour appears on both sides.
    TrailingDuration {
        /// Length of the test window in hours.
        hours: u32,
    },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::Fraction { fraction: 0.75 }
    }
}

impl SplitPolicy {
    /// A trailing window of whole days, saturating at `u32::MAX` hours.
    #[must_use]
    pub const fn trailing_days(days: u32) -> Self {
        Self::TrailingDuration {
            hours: days.saturating_mul(24),
        }
    }
}

impl std::fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fraction { fraction } => write!(f, "fraction {fraction}"),
            Self::TrailingDuration { hours } if hours % 24 == 0 => {
                write!(f, "trailing {} days", hours / 24)
            }
            Self::TrailingDuration { hours } => write!(f, "trailing {hours} hours"),
        }
    }
}

/// Where a split was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitCutoff {
    /// Index of the first test row in the hour-sorted panel.
    RowIndex(usize),
    /// First test hour.
    Timestamp(NaiveDateTime),
}

impl std::fmt::Display for SplitCutoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowIndex(idx) => write!(f, "row {idx}"),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(timestamp::FORMAT)),
        }
    }
}

/// A panel partitioned into train and test, each sorted by hour.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPanel<T> {
    /// Rows before the cutoff.
    pub train: Vec<T>,
    /// Rows at or after the cutoff.
    pub test: Vec<T>,
    /// The cut that produced this split.
    pub cutoff: SplitCutoff,
}

impl<T: PanelRow> SplitPanel<T> {
    /// Latest training hour.
    #[must_use]
    pub fn train_max_hour(&self) -> Option<NaiveDateTime> {
        self.train.iter().map(PanelRow::hour_timestamp).max()
    }

    /// Earliest test hour.
    #[must_use]
    pub fn test_min_hour(&self) -> Option<NaiveDateTime> {
        self.test.iter().map(PanelRow::hour_timestamp).min()
    }

    /// Whether some hour appears in both train and test.
    #[must_use]
    pub fn shares_boundary_hour(&self) -> bool {
        match (self.train_max_hour(), self.test_min_hour()) {
            (Some(train), Some(test)) => train >= test,
            _ => false,
        }
    }
}

// ── Predictions ──────────────────────────────────────────────────────────

/// One test-row forecast.
///
/// `predicted` is `None` when the estimator had nothing to base a forecast
/// on; such rows are excluded from error metrics and counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Origin zone id.
    pub zone_id: u32,
    /// Borough of the zone, if known.
    pub borough: Option<String>,
    /// Display name of the zone, if known.
    pub zone_name: Option<String>,
    /// Start of the hour bucket.
    #[serde(with = "timestamp")]
    pub hour_timestamp: NaiveDateTime,
    /// Observed pickups.
    pub actual: f64,
    /// Forecast pickups.
    pub predicted: Option<f64>,
}

// ── Model parameters ─────────────────────────────────────────────────────

/// Hyperparameters of the gradient-boosted tree regressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's output.
    pub learning_rate: f64,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum rows on each side of a split.
    pub min_samples_leaf: usize,
    /// Maximum histogram bins per numeric feature.
    pub max_bins: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 6,
            min_samples_leaf: 20,
            max_bins: 64,
        }
    }
}
