//! Per-zone feature derivation.
//!
//! Lags and rolling means are positional: `lag_k` at position `i` of a
//! zone's chronological sequence is the count at position `i - k`, and
//! `roll_mean_w` is the mean of positions `i - w .. i`. Neither ever reads
//! position `i` or later. On a zero-filled panel positions are hours, so
//! these equal wall-clock lags; on a sparse panel they do not, and zones
//! with gaps are counted in [`FeatureSummary::gapped_zones`].

use chrono::TimeDelta;
use taxi_demand_features_models::{FeatureRecord, FeatureSummary, LAGS, ROLLING_WINDOWS};
use taxi_demand_grid_models::{CalendarSlot, DemandRecord};

use crate::FeatureError;

/// Derives feature rows from a demand panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngine;

/// Admitted feature rows together with the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// Admitted rows, sorted by `(zone_id, hour_timestamp)`.
    pub records: Vec<FeatureRecord>,
    /// Counts in and out.
    pub summary: FeatureSummary,
}

impl FeatureEngine {
    /// Builds the feature panel.
    ///
    /// The input is re-sorted by `(zone_id, hour_timestamp)` regardless of
    /// its order. Rows without `lag_1`, `lag_2`, `lag_24`, and
    /// `roll_mean_24` are dropped, so a zone needs at least 25 rows to
    /// contribute anything.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::DuplicateRow`] if two rows share a
    /// `(zone_id, hour_timestamp)`.
    pub fn build(&self, panel: &[DemandRecord]) -> Result<FeatureSet, FeatureError> {
        let mut sorted: Vec<&DemandRecord> = panel.iter().collect();
        sorted.sort_by_key(|r| (r.zone_id, r.hour_timestamp));

        if let Some(pair) = sorted
            .windows(2)
            .find(|w| w[0].zone_id == w[1].zone_id && w[0].hour_timestamp == w[1].hour_timestamp)
        {
            return Err(FeatureError::DuplicateRow {
                zone_id: pair[0].zone_id,
                hour_timestamp: pair[0].hour_timestamp,
            });
        }

        let mut summary = FeatureSummary {
            rows_in: panel.len() as u64,
            ..FeatureSummary::default()
        };
        let mut records = Vec::new();

        for zone in sorted.chunk_by(|a, b| a.zone_id == b.zone_id) {
            summary.zones_in += 1;
            if has_gaps(zone) {
                summary.gapped_zones += 1;
            }

            let before = records.len();
            records.extend(zone_features(zone).into_iter().filter(is_admissible));
            if records.len() > before {
                summary.zones_out += 1;
            }
        }

        summary.rows_out = records.len() as u64;
        log_summary(&summary);

        Ok(FeatureSet { records, summary })
    }
}

/// Whether a feature row has the minimum history to be kept.
#[must_use]
pub const fn is_admissible(record: &FeatureRecord) -> bool {
    record.lag_1.is_some()
        && record.lag_2.is_some()
        && record.lag_24.is_some()
        && record.roll_mean_24.is_some()
}

/// Derives features for every row of one zone, before admission.
///
/// `zone` must be a single zone's rows in chronological order.
#[must_use]
pub fn zone_features(zone: &[&DemandRecord]) -> Vec<FeatureRecord> {
    let counts: Vec<f64> = zone.iter().map(|r| f64::from(r.pickup_count)).collect();

    let mut prefix = Vec::with_capacity(counts.len() + 1);
    prefix.push(0.0);
    for count in &counts {
        prefix.push(prefix[prefix.len() - 1] + count);
    }

    let lag = |i: usize, k: usize| i.checked_sub(k).map(|j| counts[j]);
    #[allow(clippy::cast_precision_loss)]
    let roll = |i: usize, w: usize| i.checked_sub(w).map(|j| (prefix[i] - prefix[j]) / w as f64);

    let [prev_lag, second_lag, daily_lag, weekly_lag] = LAGS;
    let [short_window, medium_window, daily_window, weekly_window] = ROLLING_WINDOWS;

    zone.iter()
        .enumerate()
        .map(|(i, record)| {
            let slot = CalendarSlot::of(record.hour_timestamp);
            let lag_168 = lag(i, weekly_lag);
            let roll_mean_168 = roll(i, weekly_window);
            FeatureRecord {
                zone_id: record.zone_id,
                hour_timestamp: record.hour_timestamp,
                pickup_count: record.pickup_count,
                borough: record.borough.clone(),
                zone_name: record.zone_name.clone(),
                hour: slot.hour,
                day_of_week: slot.day_of_week,
                is_weekend: slot.is_weekend(),
                hour_of_week: slot.hour_of_week,
                lag_1: lag(i, prev_lag),
                lag_2: lag(i, second_lag),
                lag_24: lag(i, daily_lag),
                lag_168,
                roll_mean_3: roll(i, short_window),
                roll_mean_6: roll(i, medium_window),
                roll_mean_24: roll(i, daily_window),
                roll_mean_168,
                has_lag_168: lag_168.is_some(),
                has_roll_168: roll_mean_168.is_some(),
            }
        })
        .collect()
}

fn has_gaps(zone: &[&DemandRecord]) -> bool {
    let step = TimeDelta::hours(1);
    zone.windows(2)
        .any(|w| w[1].hour_timestamp - w[0].hour_timestamp != step)
}

fn log_summary(summary: &FeatureSummary) {
    log::info!(
        "Features: {} panel rows in, {} admitted ({} zones of {}), retention {}",
        summary.rows_in,
        summary.rows_out,
        summary.zones_out,
        summary.zones_in,
        summary
            .retention_ratio()
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0))
    );
    if summary.gapped_zones > 0 {
        log::warn!(
            "{} zones have missing hours; their lags are positional, not wall-clock",
            summary.gapped_zones
        );
    }
}
