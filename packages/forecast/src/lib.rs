#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Forecasting over the demand and feature panels.
//!
//! [`TemporalSplitter`] cuts a panel chronologically, [`BaselineEstimator`]
//! provides the hour-of-week reference forecast, and the [`Regressor`] /
//! [`FittedRegressor`] pair is the only thing the pipeline knows about a
//! learned model. [`GradientBoostedTrees`] is the bundled implementation.

pub mod baseline;
pub mod gbt;
pub mod matrix;
pub mod regressor;
pub mod split;

pub use baseline::{BaselineCoverage, BaselineEstimator, BaselineSource, FittedBaseline};
pub use gbt::{FittedTrees, GradientBoostedTrees};
pub use matrix::{ColumnKind, FeatureMatrix};
pub use regressor::{FittedRegressor, Regressor};
pub use split::TemporalSplitter;

use taxi_demand_grid_models::MissingColumns;

/// Errors that can occur while splitting, fitting, or predicting.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    /// A split or fit request that cannot be satisfied by the data.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of what went wrong.
        message: String,
    },

    /// A model hyperparameter is out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what went wrong.
        message: String,
    },

    /// Two inputs that must line up row-for-row do not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A feature matrix lacks columns the model was fitted on.
    #[error(transparent)]
    Schema(#[from] MissingColumns),
}
