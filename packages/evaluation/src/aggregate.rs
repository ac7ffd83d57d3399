//! Pointwise errors rolled up overall, per zone, and per time-of-week
//! segment.

use std::collections::BTreeMap;

use taxi_demand_evaluation_models::{
    ErrorReport, OverallMetrics, SegmentErrorSummary, ZoneErrorSummary,
};
use taxi_demand_forecast_models::PredictionRecord;
use taxi_demand_grid_models::CalendarSlot;

/// Percentile reported as `p95_actual`.
const ACTUAL_QUANTILE: f64 = 0.95;

/// Computes [`ErrorReport`]s from prediction tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAggregator;

#[derive(Debug, Default, Clone, Copy)]
struct ErrorSums {
    n: u64,
    abs: f64,
    sq: f64,
}

impl ErrorSums {
    fn add(&mut self, error: f64) {
        self.n += 1;
        self.abs += error.abs();
        self.sq += error * error;
    }

    #[allow(clippy::cast_precision_loss)]
    fn metrics(self) -> OverallMetrics {
        if self.n == 0 {
            return OverallMetrics::default();
        }
        let n = self.n as f64;
        OverallMetrics {
            n: self.n,
            mae: self.abs / n,
            rmse: (self.sq / n).sqrt(),
        }
    }
}

#[derive(Debug, Default)]
struct ZoneSums<'a> {
    borough: Option<&'a str>,
    zone_name: Option<&'a str>,
    errors: ErrorSums,
    actuals: Vec<f64>,
}

impl ErrorAggregator {
    /// Aggregates `predictions`.
    ///
    /// Rows without a prediction (or with a non-finite one) are not scored
    /// and are counted in [`ErrorReport::excluded`]. Zone attributes come
    /// from the first scored row of each zone.
    #[must_use]
    pub fn aggregate(&self, predictions: &[PredictionRecord]) -> ErrorReport {
        let mut overall = ErrorSums::default();
        let mut zones: BTreeMap<u32, ZoneSums<'_>> = BTreeMap::new();
        let mut segments: BTreeMap<(u8, u8), ErrorSums> = BTreeMap::new();
        let mut excluded = 0u64;

        for record in predictions {
            let Some(predicted) = record.predicted.filter(|p| p.is_finite()) else {
                excluded += 1;
                continue;
            };
            let error = record.actual - predicted;
            overall.add(error);

            let zone = zones.entry(record.zone_id).or_insert_with(|| ZoneSums {
                borough: record.borough.as_deref(),
                zone_name: record.zone_name.as_deref(),
                ..ZoneSums::default()
            });
            zone.errors.add(error);
            zone.actuals.push(record.actual);

            let slot = CalendarSlot::of(record.hour_timestamp);
            segments
                .entry((slot.day_of_week, slot.hour))
                .or_default()
                .add(error);
        }

        let by_zone = zones
            .into_iter()
            .map(|(zone_id, sums)| zone_summary(zone_id, sums))
            .collect();
        let by_segment = segments
            .into_iter()
            .map(|((day_of_week, hour), sums)| {
                let m = sums.metrics();
                SegmentErrorSummary {
                    day_of_week,
                    hour,
                    n: m.n,
                    mae: m.mae,
                    rmse: m.rmse,
                }
            })
            .collect();

        let report = ErrorReport {
            overall: overall.metrics(),
            by_zone,
            by_segment,
            excluded,
        };

        log::info!(
            "Scored {} predictions: MAE {:.3}, RMSE {:.3} across {} zones and {} segments",
            report.overall.n,
            report.overall.mae,
            report.overall.rmse,
            report.by_zone.len(),
            report.by_segment.len()
        );
        if excluded > 0 {
            log::warn!("{excluded} predictions were missing and excluded from error metrics");
        }
        if report.overall.n == 0 && !predictions.is_empty() {
            log::warn!("No prediction could be scored");
        }

        report
    }
}

#[allow(clippy::cast_precision_loss)]
fn zone_summary(zone_id: u32, mut sums: ZoneSums<'_>) -> ZoneErrorSummary {
    let m = sums.errors.metrics();
    let avg_actual = sums.actuals.iter().sum::<f64>() / sums.actuals.len() as f64;
    sums.actuals.sort_by(f64::total_cmp);
    let mae_as_fraction_of_avg = if avg_actual == 0.0 {
        f64::INFINITY
    } else {
        m.mae / avg_actual
    };
    ZoneErrorSummary {
        zone_id,
        borough: sums.borough.map(str::to_string),
        zone_name: sums.zone_name.map(str::to_string),
        n: m.n,
        mae: m.mae,
        rmse: m.rmse,
        avg_actual,
        p95_actual: quantile(&sums.actuals, ACTUAL_QUANTILE),
        mae_as_fraction_of_avg,
    }
}

/// Linear-interpolation quantile of sorted, non-empty `values`, taken at
/// position `q * (n - 1)`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// ── Rankings ─────────────────────────────────────────────────────────────

/// The `n` zones with the largest MAE. Ties keep their input order.
#[must_use]
pub fn worst_by_mae(zones: &[ZoneErrorSummary], n: usize) -> Vec<&ZoneErrorSummary> {
    let mut ranked: Vec<&ZoneErrorSummary> = zones.iter().collect();
    ranked.sort_by(|a, b| b.mae.total_cmp(&a.mae));
    ranked.truncate(n);
    ranked
}

/// The `n` zones with the largest MAE relative to their mean demand.
///
/// Zones whose ratio is not finite (no pickups at all during the test
/// period) are left out rather than ranked first.
#[must_use]
pub fn worst_by_relative_mae(zones: &[ZoneErrorSummary], n: usize) -> Vec<&ZoneErrorSummary> {
    let mut ranked: Vec<&ZoneErrorSummary> = zones
        .iter()
        .filter(|z| z.has_finite_ratio())
        .collect();
    ranked.sort_by(|a, b| b.mae_as_fraction_of_avg.total_cmp(&a.mae_as_fraction_of_avg));
    ranked.truncate(n);
    ranked
}

/// The `n` segments with the largest MAE.
#[must_use]
pub fn worst_segments(segments: &[SegmentErrorSummary], n: usize) -> Vec<&SegmentErrorSummary> {
    let mut ranked: Vec<&SegmentErrorSummary> = segments.iter().collect();
    ranked.sort_by(|a, b| b.mae.total_cmp(&a.mae));
    ranked.truncate(n);
    ranked
}
