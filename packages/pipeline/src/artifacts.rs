//! Monthly artifact layout and strict table I/O.
//!
//! Every persisted table is CSV with a fixed header. Reading a table
//! checks the header before any row is decoded, so a stage fed the wrong
//! file fails with the missing column names instead of a decode error.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use taxi_demand_grid_models::MissingColumns;

use crate::{MonthId, PipelineError, RunConfig, Stage};

/// Prefix of the boosted model's prediction tables; also used to discover
/// which months have been processed.
const MODEL_PREDICTIONS_PREFIX: &str = "lgbm_pred_";

/// Paths of every artifact of one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    processed_dir: PathBuf,
    reports_dir: PathBuf,
    month: MonthId,
}

impl ArtifactPaths {
    /// Layout for the month and directories of `config`.
    #[must_use]
    pub fn new(config: &RunConfig) -> Self {
        Self {
            processed_dir: config.paths.processed_dir.clone(),
            reports_dir: config.paths.reports_dir.clone(),
            month: config.month,
        }
    }

    /// The month these paths belong to.
    #[must_use]
    pub const fn month(&self) -> MonthId {
        self.month
    }

    fn processed(&self, stem: &str, ext: &str) -> PathBuf {
        self.processed_dir.join(format!("{stem}_{}.{ext}", self.month))
    }

    fn report(&self, stem: &str, ext: &str) -> PathBuf {
        self.reports_dir.join(format!("{stem}_{}.{ext}", self.month))
    }

    /// Zone-by-hour demand panel.
    #[must_use]
    pub fn pickups(&self) -> PathBuf {
        self.processed("pickups_zone_hour", "csv")
    }

    /// Feature panel.
    #[must_use]
    pub fn features(&self) -> PathBuf {
        self.processed("features_zone_hour", "csv")
    }

    /// Baseline predictions.
    #[must_use]
    pub fn baseline_predictions(&self) -> PathBuf {
        self.processed("baseline_pred", "csv")
    }

    /// Boosted model predictions.
    #[must_use]
    pub fn model_predictions(&self) -> PathBuf {
        self.processed_dir
            .join(format!("{MODEL_PREDICTIONS_PREFIX}{}.csv", self.month))
    }

    /// Cleaning notes of the grid build.
    #[must_use]
    pub fn eda_notes(&self) -> PathBuf {
        self.report("eda_notes", "md")
    }

    /// Machine-readable cleaning summary.
    #[must_use]
    pub fn grid_summary(&self) -> PathBuf {
        self.report("grid_summary", "json")
    }

    /// Baseline report.
    #[must_use]
    pub fn baseline_report(&self) -> PathBuf {
        self.report("baseline_report", "md")
    }

    /// Boosted model report.
    #[must_use]
    pub fn model_report(&self) -> PathBuf {
        self.report("lgbm_report", "md")
    }

    /// Per-zone error table.
    #[must_use]
    pub fn zone_errors_csv(&self) -> PathBuf {
        self.report("errors_by_zone", "csv")
    }

    /// Zone and segment error report.
    #[must_use]
    pub fn zone_errors_markdown(&self) -> PathBuf {
        self.report("errors_by_zone", "md")
    }

    /// Per-segment error table.
    #[must_use]
    pub fn segment_errors_csv(&self) -> PathBuf {
        self.report("errors_by_hour", "csv")
    }
}

/// Creates the parent directory of `path` if needed.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Writes `rows` as CSV under the header `fields`.
///
/// The header is written even when there are no rows, so an empty table
/// still passes the header check on the way back in.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be written.
pub fn write_table<T: Serialize>(
    path: &Path,
    fields: &[&str],
    rows: &[T],
) -> Result<(), PipelineError> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(fields)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Reads a table written by `producer`, checking its header first.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] if the file does not exist
/// (naming the stage that produces it), [`PipelineError::Schema`] if a
/// required column is missing, or [`PipelineError::Csv`] if a row does not
/// decode.
pub fn read_table<T: DeserializeOwned>(
    path: &Path,
    table: &str,
    required: &[&str],
    producer: Stage,
) -> Result<Vec<T>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::Configuration {
            message: format!(
                "{table} table {} not found; run the `{producer}` stage first",
                path.display()
            ),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    MissingColumns::check(table, &headers, required)?;

    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    log::info!("Read {} {table} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Writes a text artifact.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the file cannot be written.
pub fn write_text(path: &Path, contents: &str) -> Result<(), PipelineError> {
    ensure_parent(path)?;
    std::fs::write(path, contents)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Months that have boosted model predictions under `processed_dir`,
/// oldest first.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the directory exists but cannot be
/// listed.
pub fn available_months(config: &RunConfig) -> Result<Vec<MonthId>, PipelineError> {
    let dir = &config.paths.processed_dir;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut months = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(month) = name
            .strip_prefix(MODEL_PREDICTIONS_PREFIX)
            .and_then(|rest| rest.strip_suffix(".csv"))
            .and_then(|m| m.parse::<MonthId>().ok())
        {
            months.insert(month);
        }
    }
    Ok(months.into_iter().collect())
}
