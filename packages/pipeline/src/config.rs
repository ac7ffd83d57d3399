//! Immutable run configuration, loaded from TOML.
//!
//! Every section falls back to its defaults, so a config file only needs
//! the keys it changes. Stages receive the configuration by reference and
//! never read process-wide state.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use taxi_demand_forecast_models::{BoostingParams, SplitPolicy};
use taxi_demand_grid::{ColumnMapping, TripFormat};

use crate::PipelineError;

// ── Month ────────────────────────────────────────────────────────────────

/// A calendar month in `YYYY-MM` form; the key of every artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthId {
    year: i32,
    month: u32,
}

impl MonthId {
    /// Creates a month id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if `month` is not 1-12 or
    /// `year` is outside `0..=9999`.
    pub fn new(year: i32, month: u32) -> Result<Self, PipelineError> {
        if !(0..=9999).contains(&year) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(PipelineError::Configuration {
                message: format!("invalid month {year}-{month}"),
            });
        }
        Ok(Self { year, month })
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Month of the year, 1-12.
    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// Midnight on the first day of the month.
    #[must_use]
    pub fn start(self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_default()
            .and_time(NaiveTime::MIN)
    }

    /// Midnight on the first day of the following month.
    #[must_use]
    pub fn end(self) -> NaiveDateTime {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .unwrap_or_default()
            .and_time(NaiveTime::MIN)
    }
}

impl Default for MonthId {
    fn default() -> Self {
        Self {
            year: 2024,
            month: 1,
        }
    }
}

impl std::fmt::Display for MonthId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::Configuration {
            message: format!("month must be YYYY-MM, got '{s}'"),
        };
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MonthId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthId> for String {
    fn from(value: MonthId) -> Self {
        value.to_string()
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Where inputs are read from and artifacts are written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw trip files and the zone lookup.
    pub raw_dir: PathBuf,
    /// Panels and prediction tables.
    pub processed_dir: PathBuf,
    /// Markdown, CSV, and JSON reports.
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

/// Trip file location, format, and column adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripsConfig {
    /// File format.
    pub format: TripFormat,
    /// File name under `raw_dir`; `{month}` is replaced by the month id.
    pub file_template: String,
    /// Source column for each trip field.
    pub columns: ColumnMapping,
}

impl Default for TripsConfig {
    fn default() -> Self {
        Self {
            format: TripFormat::Parquet,
            file_template: "yellow_tripdata_{month}.parquet".to_string(),
            columns: ColumnMapping::yellow_taxi(),
        }
    }
}

/// Zone lookup location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonesConfig {
    /// File name under `raw_dir`.
    pub file: String,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            file: "taxi_zone_lookup.csv".to_string(),
        }
    }
}

/// How absent `(zone, hour)` pairs are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Densify {
    /// Materialize a zero-count row for every missing hour of every zone.
    #[default]
    ZeroFill,
    /// Keep only observed hours.
    Sparse,
}

/// Grid build options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Treatment of unobserved hours.
    pub densify: Densify,
    /// Drop trips whose pickup falls outside the configured month.
    pub clip_to_month: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            densify: Densify::ZeroFill,
            clip_to_month: true,
        }
    }
}

/// Baseline stage options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Split applied to the demand panel.
    pub split: SplitPolicy,
}

/// Boosted model stage options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Split applied to the feature panel.
    pub split: SplitPolicy,
    /// Regressor hyperparameters.
    pub params: BoostingParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            split: SplitPolicy::trailing_days(7),
            params: BoostingParams::default(),
        }
    }
}

// ── Run config ───────────────────────────────────────────────────────────

/// Everything a run needs to know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Month processed by every stage.
    pub month: MonthId,
    /// Input and output directories.
    pub paths: PathsConfig,
    /// Trip input.
    pub trips: TripsConfig,
    /// Zone lookup input.
    pub zones: ZonesConfig,
    /// Grid build options.
    pub grid: GridConfig,
    /// Baseline options.
    pub baseline: BaselineConfig,
    /// Boosted model options.
    pub model: ModelConfig,
}

impl RunConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if the text is not valid
    /// TOML or a value is malformed.
    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Configuration {
            message: format!("invalid run configuration: {e}"),
        })
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Configuration {
            message: format!("cannot read config {}: {e}", path.display()),
        })?;
        let config = Self::from_toml(&text)?;
        log::info!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    /// A copy of this configuration for another month.
    #[must_use]
    pub fn with_month(self, month: MonthId) -> Self {
        Self { month, ..self }
    }

    /// Path of this month's trip file.
    #[must_use]
    pub fn trips_path(&self) -> PathBuf {
        let name = self
            .trips
            .file_template
            .replace("{month}", &self.month.to_string());
        self.paths.raw_dir.join(name)
    }

    /// Path of the zone lookup.
    #[must_use]
    pub fn zones_path(&self) -> PathBuf {
        self.paths.raw_dir.join(&self.zones.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_months() {
        let m: MonthId = "2024-01".parse().unwrap();
        assert_eq!((m.year(), m.month()), (2024, 1));
        assert_eq!(m.to_string(), "2024-01");

        for bad in ["2024-13", "2024-1", "24-01", "2024/01", "", "2024-00", "abcd-ef"] {
            assert!(bad.parse::<MonthId>().is_err(), "{bad}");
        }
    }

    #[test]
    fn month_bounds() {
        let dec: MonthId = "2023-12".parse().unwrap();
        assert_eq!(dec.start().to_string(), "2023-12-01 00:00:00");
        assert_eq!(dec.end().to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn months_order_chronologically() {
        let a: MonthId = "2023-12".parse().unwrap();
        let b: MonthId = "2024-01".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let config = RunConfig::from_toml(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = RunConfig::from_toml(
            r#"
            month = "2023-06"

            [trips]
            format = "csv"
            file_template = "trips_{month}.csv"

            [trips.columns]
            pickup_ts = "pickup_ts"
            dropoff_ts = "dropoff_ts"
            zone_id = "zone_id"

            [grid]
            densify = "sparse"

            [model.params]
            n_estimators = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.month.to_string(), "2023-06");
        assert_eq!(config.trips.format, TripFormat::Csv);
        assert_eq!(config.trips.columns.trip_distance, "trip_distance");
        assert_eq!(config.grid.densify, Densify::Sparse);
        assert!(config.grid.clip_to_month);
        assert_eq!(config.model.params.n_estimators, 25);
        assert_eq!(config.model.split, SplitPolicy::trailing_days(7));
        assert_eq!(config.baseline.split, SplitPolicy::default());
        assert_eq!(
            config.trips_path(),
            PathBuf::from("data/raw/trips_2023-06.csv")
        );
    }

    #[test]
    fn rejects_malformed_month_in_file() {
        let err = RunConfig::from_toml("month = \"January\"").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }), "{err}");
    }

    #[test]
    fn with_month_overrides_only_month() {
        let config = RunConfig::default().with_month("2024-03".parse().unwrap());
        assert_eq!(config.month.to_string(), "2024-03");
        assert_eq!(config.paths, PathsConfig::default());
        assert!(config.trips_path().ends_with("yellow_tripdata_2024-03.parquet"));
    }
}
