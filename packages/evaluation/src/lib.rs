#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Forecast error diagnostics.
//!
//! [`ErrorAggregator`] turns a prediction table into an
//! [`ErrorReport`](taxi_demand_evaluation_models::ErrorReport), and
//! [`ReportRenderer`] formats that report as Markdown and CSV.

pub mod aggregate;
pub mod render;

pub use aggregate::{ErrorAggregator, worst_by_mae, worst_by_relative_mae, worst_segments};
pub use render::ReportRenderer;

/// Errors that can occur while writing evaluation output.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CSV encoding error
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
