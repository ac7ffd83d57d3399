//! The monthly stages and their orchestration.
//!
//! Each stage reads its input artifact, runs one core component, and
//! writes its output artifacts, so any stage can be re-run on its own once
//! its inputs exist.

use std::fmt::Write as _;

use strum_macros::{AsRefStr, Display, EnumString};
use taxi_demand_evaluation::{ErrorAggregator, ReportRenderer};
use taxi_demand_evaluation_models::ErrorReport;
use taxi_demand_features::FeatureEngine;
use taxi_demand_features_models::{FEATURE_FIELDS, FeatureRecord, FeatureSummary};
use taxi_demand_forecast::{
    BaselineEstimator, FeatureMatrix, FittedRegressor, GradientBoostedTrees, Regressor,
    TemporalSplitter,
};
use taxi_demand_forecast_models::{PREDICTION_FIELDS, PredictionRecord, SplitPanel};
use taxi_demand_grid::{DemandGridBuilder, load_trips};
use taxi_demand_grid_models::{CleaningSummary, DEMAND_FIELDS, DemandRecord};
use taxi_demand_zone::load_zone_calendar;

use crate::artifacts::{ArtifactPaths, read_table, write_table, write_text};
use crate::{Densify, PipelineError, ProgressCallback, RunConfig};

/// One step of the monthly run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Trips to the zone-by-hour demand panel.
    Grid,
    /// Demand panel to the feature panel.
    Features,
    /// Hour-of-week baseline on the demand panel.
    Baseline,
    /// Boosted trees on the feature panel.
    Train,
    /// Error breakdown of the boosted model's predictions.
    Evaluate,
}

impl Stage {
    /// Every stage, in run order.
    pub const ALL: &[Self] = &[
        Self::Grid,
        Self::Features,
        Self::Baseline,
        Self::Train,
        Self::Evaluate,
    ];

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Grid => "Build demand grid",
            Self::Features => "Build features",
            Self::Baseline => "Baseline (hour-of-week mean)",
            Self::Train => "Train boosted trees",
            Self::Evaluate => "Evaluate errors by zone and hour",
        }
    }
}

/// What a stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Cleaning summary of the grid build.
    Grid(CleaningSummary),
    /// Retention of the feature build.
    Features(FeatureSummary),
    /// Errors of the baseline on its test split.
    Baseline(ErrorReport),
    /// Errors of the boosted model on its test split.
    Train(ErrorReport),
    /// Full error breakdown.
    Evaluate(ErrorReport),
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grid(s) => write!(
                f,
                "grid: kept {}/{} trips, {} panel rows over {} zones",
                s.rows_after, s.rows_before, s.panel_rows, s.unique_zones
            ),
            Self::Features(s) => write!(
                f,
                "features: kept {}/{} rows over {} zones",
                s.rows_out, s.rows_in, s.zones_out
            ),
            Self::Baseline(r) => write_report_line(f, "baseline", r),
            Self::Train(r) => write_report_line(f, "train", r),
            Self::Evaluate(r) => write_report_line(f, "evaluate", r),
        }
    }
}

fn write_report_line(
    f: &mut std::fmt::Formatter<'_>,
    name: &str,
    r: &ErrorReport,
) -> std::fmt::Result {
    write!(
        f,
        "{name}: MAE {:.3}, RMSE {:.3} over {} predictions ({} excluded)",
        r.overall.mae, r.overall.rmse, r.overall.n, r.excluded
    )
}

// ── Stages ───────────────────────────────────────────────────────────────

/// Builds the demand panel from the month's trip file.
///
/// # Errors
///
/// Returns [`PipelineError`] if an input file is missing or malformed, or
/// an artifact cannot be written.
pub fn run_grid(config: &RunConfig) -> Result<CleaningSummary, PipelineError> {
    let paths = ArtifactPaths::new(config);

    let zones_path = config.zones_path();
    if !zones_path.is_file() {
        return Err(PipelineError::Configuration {
            message: format!("zone lookup {} not found", zones_path.display()),
        });
    }
    let trips_path = config.trips_path();
    if !trips_path.is_file() {
        return Err(PipelineError::Configuration {
            message: format!(
                "no trip data for {} at {}",
                config.month,
                trips_path.display()
            ),
        });
    }

    let calendar = load_zone_calendar(&zones_path)?;
    let trips = load_trips(&trips_path, config.trips.format, &config.trips.columns)?;

    let mut builder = DemandGridBuilder::new(&calendar);
    if config.grid.clip_to_month {
        builder = builder.clip_to(config.month.start(), config.month.end());
    }
    let mut grid = builder.build(&trips);
    drop(trips);
    if config.grid.densify == Densify::ZeroFill {
        grid = grid.densify(&calendar);
    }

    write_table(&paths.pickups(), &DEMAND_FIELDS, &grid.panel)?;
    write_text(&paths.eda_notes(), &eda_notes(config, &grid.summary))?;
    write_text(
        &paths.grid_summary(),
        &serde_json::to_string_pretty(&grid.summary)?,
    )?;

    Ok(grid.summary)
}

fn eda_notes(config: &RunConfig, summary: &CleaningSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# EDA Notes ({})\n", config.month);
    let _ = writeln!(out, "- Raw rows: {}", summary.rows_before);
    let _ = writeln!(out, "- Clean rows: {}", summary.rows_after);
    let _ = writeln!(out, "- Aggregated rows (zone-hour): {}", summary.panel_rows);
    let _ = writeln!(out, "- Unique zones: {}", summary.unique_zones);
    if let Some(ratio) = summary.retention_ratio() {
        let _ = writeln!(out, "- Retention: {:.1}%", ratio * 100.0);
    }
    let _ = writeln!(out, "- Zero-filled rows: {}", summary.zero_filled_rows);

    if !summary.drop_reasons.is_empty() {
        out.push_str("\n## Dropped rows\n\n");
        for (reason, count) in &summary.drop_reasons {
            let _ = writeln!(out, "- {reason}: {count}");
        }
    }
    if !summary.unmatched_zone_ids.is_empty() {
        let ids: Vec<String> = summary
            .unmatched_zone_ids
            .iter()
            .map(ToString::to_string)
            .collect();
        let _ = writeln!(
            out,
            "\n## Zones missing from the lookup\n\n{}",
            ids.join(", ")
        );
    }
    out
}

/// Derives the feature panel from the demand panel.
///
/// # Errors
///
/// Returns [`PipelineError`] if the demand panel is missing or malformed.
pub fn run_features(config: &RunConfig) -> Result<FeatureSummary, PipelineError> {
    let paths = ArtifactPaths::new(config);
    let panel: Vec<DemandRecord> =
        read_table(&paths.pickups(), "pickups", &DEMAND_FIELDS, Stage::Grid)?;

    let features = FeatureEngine.build(&panel)?;
    write_table(&paths.features(), &FEATURE_FIELDS, &features.records)?;
    Ok(features.summary)
}

/// Fits and scores the hour-of-week baseline on the demand panel.
///
/// # Errors
///
/// Returns [`PipelineError`] if the demand panel is missing or the split
/// leaves an empty side.
pub fn run_baseline(config: &RunConfig) -> Result<ErrorReport, PipelineError> {
    let paths = ArtifactPaths::new(config);
    let panel: Vec<DemandRecord> =
        read_table(&paths.pickups(), "pickups", &DEMAND_FIELDS, Stage::Grid)?;

    let split = TemporalSplitter::new(config.baseline.split).split(panel)?;
    let fitted = BaselineEstimator.fit(&split.train);
    let (predicted, _coverage) = fitted.predict(&split.test);

    let predictions: Vec<PredictionRecord> = split
        .test
        .into_iter()
        .zip(predicted)
        .map(|(row, predicted)| PredictionRecord {
            zone_id: row.zone_id,
            borough: row.borough,
            zone_name: row.zone_name,
            hour_timestamp: row.hour_timestamp,
            actual: f64::from(row.pickup_count),
            predicted,
        })
        .collect();
    write_table(&paths.baseline_predictions(), &PREDICTION_FIELDS, &predictions)?;

    let report = ErrorAggregator.aggregate(&predictions);
    let renderer = ReportRenderer::new(config.month.to_string());
    write_text(&paths.baseline_report(), &renderer.baseline_markdown(&report))?;
    Ok(report)
}

/// Fits the boosted model on the feature panel and scores it.
///
/// # Errors
///
/// Returns [`PipelineError`] if the feature panel is missing, the split
/// leaves an empty side, or the model parameters are invalid.
pub fn run_train(config: &RunConfig) -> Result<ErrorReport, PipelineError> {
    let paths = ArtifactPaths::new(config);
    let features: Vec<FeatureRecord> = read_table(
        &paths.features(),
        "features",
        &FEATURE_FIELDS,
        Stage::Features,
    )?;

    let split = TemporalSplitter::new(config.model.split).split(features)?;
    let regressor = GradientBoostedTrees::new(config.model.params);
    let (predictions, importance) = forecast_with(&regressor, split)?;
    write_table(&paths.model_predictions(), &PREDICTION_FIELDS, &predictions)?;

    let report = ErrorAggregator.aggregate(&predictions);
    let renderer = ReportRenderer::new(config.month.to_string());
    write_text(
        &paths.model_report(),
        &renderer.model_markdown(&report, &importance),
    )?;
    Ok(report)
}

/// Fits `regressor` on the train side and predicts the test side.
///
/// Returns one prediction per test row plus the model's feature
/// importance.
///
/// # Errors
///
/// Returns [`PipelineError::Forecast`] if fitting or prediction fails.
pub fn forecast_with<R: Regressor>(
    regressor: &R,
    split: SplitPanel<FeatureRecord>,
) -> Result<(Vec<PredictionRecord>, Vec<(String, u64)>), PipelineError> {
    let target: Vec<f64> = split
        .train
        .iter()
        .map(|r| f64::from(r.pickup_count))
        .collect();
    let fitted = regressor.fit(&FeatureMatrix::from_features(&split.train), &target)?;
    let predicted = fitted.predict(&FeatureMatrix::from_features(&split.test))?;

    let predictions = split
        .test
        .into_iter()
        .zip(predicted)
        .map(|(row, predicted)| PredictionRecord {
            zone_id: row.zone_id,
            borough: row.borough,
            zone_name: row.zone_name,
            hour_timestamp: row.hour_timestamp,
            actual: f64::from(row.pickup_count),
            predicted: Some(predicted),
        })
        .collect();
    Ok((predictions, fitted.feature_importance()))
}

/// Breaks the boosted model's errors down by zone and segment.
///
/// # Errors
///
/// Returns [`PipelineError`] if the prediction table is missing or
/// malformed, or a report cannot be written.
pub fn run_evaluate(config: &RunConfig) -> Result<ErrorReport, PipelineError> {
    let paths = ArtifactPaths::new(config);
    let predictions: Vec<PredictionRecord> = read_table(
        &paths.model_predictions(),
        "predictions",
        &PREDICTION_FIELDS,
        Stage::Train,
    )?;

    let report = ErrorAggregator.aggregate(&predictions);
    let renderer = ReportRenderer::new(config.month.to_string());

    let zone_csv = paths.zone_errors_csv();
    crate::artifacts::ensure_parent(&zone_csv)?;
    renderer.write_zone_csv(&report, std::fs::File::create(&zone_csv)?)?;
    renderer.write_segment_csv(
        &report,
        std::fs::File::create(paths.segment_errors_csv())?,
    )?;
    write_text(
        &paths.zone_errors_markdown(),
        &renderer.error_markdown(&report),
    )?;
    log::info!("Wrote error tables for {}", config.month);
    Ok(report)
}

/// Runs one stage.
///
/// # Errors
///
/// Returns [`PipelineError`] from the stage.
pub fn run_stage(config: &RunConfig, stage: Stage) -> Result<StageOutcome, PipelineError> {
    log::info!("Stage {stage} for {}", config.month);
    Ok(match stage {
        Stage::Grid => StageOutcome::Grid(run_grid(config)?),
        Stage::Features => StageOutcome::Features(run_features(config)?),
        Stage::Baseline => StageOutcome::Baseline(run_baseline(config)?),
        Stage::Train => StageOutcome::Train(run_train(config)?),
        Stage::Evaluate => StageOutcome::Evaluate(run_evaluate(config)?),
    })
}

/// Runs `stages` in run order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first [`PipelineError`] any stage reports.
pub fn run_stages(
    config: &RunConfig,
    stages: &[Stage],
    progress: &dyn ProgressCallback,
) -> Result<Vec<StageOutcome>, PipelineError> {
    let selected: Vec<Stage> = Stage::ALL
        .iter()
        .copied()
        .filter(|s| stages.contains(s))
        .collect();

    progress.set_total(selected.len() as u64);
    let mut outcomes = Vec::with_capacity(selected.len());
    for stage in selected {
        progress.set_message(stage.label().to_string());
        outcomes.push(run_stage(config, stage)?);
        progress.inc(1);
    }
    progress.finish(format!("{} complete", config.month));
    Ok(outcomes)
}

/// Runs every stage in order.
///
/// # Errors
///
/// Returns the first [`PipelineError`] any stage reports.
pub fn run_all(
    config: &RunConfig,
    progress: &dyn ProgressCallback,
) -> Result<Vec<StageOutcome>, PipelineError> {
    run_stages(config, Stage::ALL, progress)
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;
    use std::path::Path;

    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use taxi_demand_forecast_models::{BoostingParams, SplitPolicy};
    use taxi_demand_grid::TripFormat;
    use taxi_demand_grid_models::{DropReason, timestamp};

    use super::*;
    use crate::NullProgress;

    const HOURS: i64 = 240;

    fn at(hours: i64, minutes: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + TimeDelta::hours(hours)
            + TimeDelta::minutes(minutes)
    }

    fn fmt(ts: NaiveDateTime) -> String {
        ts.format(timestamp::FORMAT).to_string()
    }

    /// Two zones with an hourly pattern over ten days, one malformed trip,
    /// and one trip from the previous month.
    fn write_inputs(raw: &Path) {
        std::fs::create_dir_all(raw).unwrap();
        std::fs::write(
            raw.join("taxi_zone_lookup.csv"),
            "LocationID,Borough,Zone,service_zone\n\
             1,EWR,Newark Airport,EWR\n\
             2,Queens,Jamaica Bay,Boro Zone\n",
        )
        .unwrap();

        let mut trips = String::from("pickup_ts,dropoff_ts,zone_id,trip_distance\n");
        for h in 0..HOURS {
            for zone in 1..=2_i64 {
                let count = 1 + (h % 24) / 6 + zone;
                for k in 0..count {
                    let pickup = at(h, k * 5);
                    let dropoff = pickup + TimeDelta::minutes(12);
                    let _ = writeln!(trips, "{},{},{zone},1.5", fmt(pickup), fmt(dropoff));
                }
            }
        }
        let _ = writeln!(trips, "{},{},1,1.5", fmt(at(5, 30)), fmt(at(5, 10)));
        let _ = writeln!(trips, "{},{},2,1.5", fmt(at(-3, 0)), fmt(at(-3, 10)));
        std::fs::write(raw.join("trips_2024-01.csv"), trips).unwrap();
    }

    fn config_in(dir: &Path) -> RunConfig {
        let mut config = RunConfig::default();
        config.paths.raw_dir = dir.join("raw");
        config.paths.processed_dir = dir.join("processed");
        config.paths.reports_dir = dir.join("reports");
        config.trips.format = TripFormat::Csv;
        config.trips.file_template = "trips_{month}.csv".to_string();
        config.trips.columns = taxi_demand_grid::ColumnMapping::identity();
        config.model.params = BoostingParams {
            n_estimators: 20,
            learning_rate: 0.3,
            max_depth: 3,
            min_samples_leaf: 5,
            max_bins: 32,
        };
        config
    }

    #[test]
    fn full_run_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir.path().join("raw"));
        let config = config_in(dir.path());

        let outcomes = run_all(&config, &NullProgress).unwrap();
        assert_eq!(outcomes.len(), Stage::ALL.len());

        let StageOutcome::Grid(summary) = &outcomes[0] else {
            panic!("expected grid outcome first");
        };
        assert_eq!(summary.dropped_for(DropReason::NonPositiveDuration), 1);
        assert_eq!(summary.dropped_for(DropReason::OutsideMonth), 1);
        assert_eq!(summary.rows_dropped, 2);
        assert_eq!(summary.unique_zones, 2);
        assert_eq!(summary.panel_rows, 480);

        let paths = ArtifactPaths::new(&config);
        for path in [
            paths.pickups(),
            paths.features(),
            paths.baseline_predictions(),
            paths.model_predictions(),
            paths.eda_notes(),
            paths.grid_summary(),
            paths.baseline_report(),
            paths.model_report(),
            paths.zone_errors_csv(),
            paths.zone_errors_markdown(),
            paths.segment_errors_csv(),
        ] {
            assert!(path.is_file(), "missing {}", path.display());
        }

        let notes = std::fs::read_to_string(paths.eda_notes()).unwrap();
        assert!(notes.starts_with("# EDA Notes (2024-01)"));
        assert!(notes.contains("- Aggregated rows (zone-hour): 480"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(paths.grid_summary()).unwrap())
                .unwrap();
        assert_eq!(json["panelRows"], 480);

        // The trailing week holds 169 hours for each zone.
        let StageOutcome::Train(train) = &outcomes[3] else {
            panic!("expected train outcome");
        };
        assert_eq!(train.overall.n, 2 * 169);
        assert_eq!(train.excluded, 0);

        let StageOutcome::Evaluate(evaluate) = &outcomes[4] else {
            panic!("expected evaluate outcome");
        };
        assert_eq!(evaluate.overall.n, train.overall.n);
        assert!((evaluate.overall.mae - train.overall.mae).abs() < 1e-9);
        assert_eq!(evaluate.by_zone.len(), 2);

        let report = std::fs::read_to_string(paths.model_report()).unwrap();
        assert!(report.contains("## Feature importance"));

        let months = crate::available_months(&config).unwrap();
        assert_eq!(months, vec![config.month]);
    }

    #[test]
    fn baseline_predicts_every_test_row_of_known_zones() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir.path().join("raw"));
        let config = config_in(dir.path());

        run_grid(&config).unwrap();
        let report = run_baseline(&config).unwrap();
        assert_eq!(report.overall.n, 120);
        assert_eq!(report.excluded, 0);

        let text = std::fs::read_to_string(ArtifactPaths::new(&config).baseline_report()).unwrap();
        assert!(text.starts_with("# Baseline report (2024-01)"));
        assert!(text.contains("## Top 10 zones by mean absolute error"));
    }

    #[test]
    fn sparse_grid_keeps_only_observed_hours() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        write_inputs(&raw);
        let mut config = config_in(dir.path());
        config.grid.densify = Densify::Sparse;
        config.grid.clip_to_month = false;

        let summary = run_grid(&config).unwrap();
        assert_eq!(summary.zero_filled_rows, 0);
        assert_eq!(summary.dropped_for(DropReason::OutsideMonth), 0);
        assert_eq!(summary.panel_rows, 481);
    }

    #[test]
    fn stage_without_input_names_its_prerequisite() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let err = run_features(&config).unwrap_err();
        assert!(err.to_string().contains("`grid`"), "{err}");

        let err = run_evaluate(&config).unwrap_err();
        assert!(err.to_string().contains("`train`"), "{err}");
    }

    #[test]
    fn missing_month_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir.path().join("raw"));
        let config = config_in(dir.path()).with_month("2023-07".parse().unwrap());
        let err = run_grid(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
        assert!(err.to_string().contains("2023-07"), "{err}");
    }

    #[test]
    fn split_leaving_no_training_rows_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir.path().join("raw"));
        let mut config = config_in(dir.path());
        config.model.split = SplitPolicy::trailing_days(30);

        run_grid(&config).unwrap();
        run_features(&config).unwrap();
        let err = run_train(&config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Forecast(taxi_demand_forecast::ForecastError::Configuration { .. })
        ));
    }

    #[test]
    fn stages_run_in_order_regardless_of_selection_order() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(&dir.path().join("raw"));
        let config = config_in(dir.path());
        let outcomes =
            run_stages(&config, &[Stage::Features, Stage::Grid], &NullProgress).unwrap();
        assert!(matches!(outcomes[0], StageOutcome::Grid(_)));
        assert!(matches!(outcomes[1], StageOutcome::Features(_)));
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Evaluate.to_string(), "evaluate");
        assert_eq!("train".parse::<Stage>().unwrap(), Stage::Train);
    }
}
