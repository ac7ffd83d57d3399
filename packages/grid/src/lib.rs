#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Builds the zone-by-hour demand panel from raw trip files.
//!
//! Reading ([`trips`]) and cleaning/aggregation ([`builder`]) are separate
//! so that trips from any source go through the same cleaning rules.
//! Malformed trips never fail a build: they are counted per
//! [`DropReason`](taxi_demand_grid_models::DropReason) in the
//! [`CleaningSummary`](taxi_demand_grid_models::CleaningSummary).

pub mod builder;
pub mod parsing;
pub mod trips;

pub use builder::{DemandGrid, DemandGridBuilder, MAX_TRIP_MINUTES, densify_panel};
pub use trips::{ColumnMapping, TripFormat, load_trips, load_trips_parquet, read_trips_csv};

use taxi_demand_grid_models::MissingColumns;

/// Errors that can occur while reading trip files.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `DuckDB` error while scanning a Parquet file.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A mapped trip column is missing.
    #[error(transparent)]
    Schema(#[from] MissingColumns),
}
