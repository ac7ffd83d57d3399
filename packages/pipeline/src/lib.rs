#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Monthly batch orchestration for taxi demand forecasting.
//!
//! A [`RunConfig`] names the month, the input files, and every stage
//! option. The stages ([`run_grid`], [`run_features`], [`run_baseline`],
//! [`run_train`], [`run_evaluate`]) each read and write artifacts keyed by
//! that month (see [`ArtifactPaths`]), so they can run together through
//! [`run_all`] or one at a time.

pub mod artifacts;
pub mod config;
pub mod progress;
pub mod stages;

pub use artifacts::{ArtifactPaths, available_months, read_table, write_table};
pub use config::{
    BaselineConfig, Densify, GridConfig, ModelConfig, MonthId, PathsConfig, RunConfig,
    TripsConfig, ZonesConfig,
};
pub use progress::{NullProgress, ProgressCallback};
pub use stages::{
    Stage, StageOutcome, forecast_with, run_all, run_baseline, run_evaluate, run_features,
    run_grid, run_stage, run_stages, run_train,
};

use taxi_demand_evaluation::EvaluationError;
use taxi_demand_features::FeatureError;
use taxi_demand_forecast::ForecastError;
use taxi_demand_grid::GridError;
use taxi_demand_grid_models::MissingColumns;
use taxi_demand_zone::ZoneError;

/// Errors that can abort a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The run cannot proceed as configured: malformed month or config,
    /// missing input data, or a stage run before its prerequisite.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of what went wrong.
        message: String,
    },

    /// An artifact table lacks required columns.
    #[error(transparent)]
    Schema(#[from] MissingColumns),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CSV error
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Zone lookup error
    #[error(transparent)]
    Zone(#[from] ZoneError),

    /// Trip reading error
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Feature engineering error
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Splitting or model error
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    /// Report writing error
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
