//! Historical hour-of-week mean baseline.
//!
//! Lookup precedence is fixed: the zone's mean for the exact hour-of-week
//! slot, then the zone's overall mean, then no prediction at all. A zone
//! never seen in training is reported as missing rather than zero.

use std::collections::BTreeMap;

use taxi_demand_grid_models::PanelRow;

/// Fits [`FittedBaseline`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineEstimator;

/// Which level of the fallback chain served a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSource {
    /// Mean of the zone's training rows in the same hour-of-week.
    Slot,
    /// Mean of all the zone's training rows.
    ZoneMean,
    /// Zone absent from training; no prediction.
    Unseen,
}

/// How many predictions each fallback level served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineCoverage {
    /// Served from a `(zone, hour_of_week)` slot.
    pub slot: u64,
    /// Served from the zone mean.
    pub zone_mean: u64,
    /// Left missing.
    pub unseen: u64,
}

impl BaselineCoverage {
    fn record(&mut self, source: BaselineSource) {
        match source {
            BaselineSource::Slot => self.slot += 1,
            BaselineSource::ZoneMean => self.zone_mean += 1,
            BaselineSource::Unseen => self.unseen += 1,
        }
    }
}

/// Per-zone slot and zone means learned from a training panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FittedBaseline {
    slot_means: BTreeMap<(u32, u8), f64>,
    zone_means: BTreeMap<u32, f64>,
}

impl BaselineEstimator {
    /// Learns slot and zone means from `train`.
    #[must_use]
    pub fn fit<T: PanelRow>(&self, train: &[T]) -> FittedBaseline {
        let mut slots: BTreeMap<(u32, u8), Accumulator> = BTreeMap::new();
        let mut zones: BTreeMap<u32, Accumulator> = BTreeMap::new();

        for row in train {
            let count = f64::from(row.pickup_count());
            let slot = row.calendar().hour_of_week;
            slots.entry((row.zone_id(), slot)).or_default().add(count);
            zones.entry(row.zone_id()).or_default().add(count);
        }

        let fitted = FittedBaseline {
            slot_means: slots.into_iter().map(|(k, acc)| (k, acc.mean())).collect(),
            zone_means: zones.into_iter().map(|(k, acc)| (k, acc.mean())).collect(),
        };
        log::info!(
            "Baseline fitted on {} rows: {} zones, {} (zone, hour_of_week) slots",
            train.len(),
            fitted.zone_means.len(),
            fitted.slot_means.len()
        );
        fitted
    }
}

impl FittedBaseline {
    /// Predicts one `(zone, hour_of_week)` and reports which level served it.
    #[must_use]
    pub fn predict_slot(&self, zone_id: u32, hour_of_week: u8) -> (Option<f64>, BaselineSource) {
        if let Some(&mean) = self.slot_means.get(&(zone_id, hour_of_week)) {
            (Some(mean), BaselineSource::Slot)
        } else if let Some(&mean) = self.zone_means.get(&zone_id) {
            (Some(mean), BaselineSource::ZoneMean)
        } else {
            (None, BaselineSource::Unseen)
        }
    }

    /// Predicts every row of `test`, aligned row-for-row.
    #[must_use]
    pub fn predict<T: PanelRow>(&self, test: &[T]) -> (Vec<Option<f64>>, BaselineCoverage) {
        let mut coverage = BaselineCoverage::default();
        let predictions = test
            .iter()
            .map(|row| {
                let (prediction, source) =
                    self.predict_slot(row.zone_id(), row.calendar().hour_of_week);
                coverage.record(source);
                prediction
            })
            .collect();

        log::info!(
            "Baseline coverage: {} slot, {} zone mean, {} unseen",
            coverage.slot,
            coverage.zone_mean,
            coverage.unseen
        );
        if coverage.unseen > 0 {
            log::warn!(
                "{} test rows belong to zones absent from training and have no baseline prediction",
                coverage.unseen
            );
        }

        (predictions, coverage)
    }
}

/// Running sum and count.
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    n: u64,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.n += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(self) -> f64 {
        self.sum / self.n as f64
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use taxi_demand_grid_models::{CalendarSlot, DemandRecord};

    use super::*;

    /// Hour `hour_of_week` of week `week`, counting from Monday 2024-01-01.
    fn at(week: i64, hour_of_week: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + TimeDelta::hours(week * 168 + hour_of_week)
    }

    fn row(zone_id: u32, week: i64, hour_of_week: i64, pickup_count: u32) -> DemandRecord {
        DemandRecord {
            zone_id,
            hour_timestamp: at(week, hour_of_week),
            pickup_count,
            borough: None,
            zone_name: None,
        }
    }

    #[test]
    fn slot_mean_is_exact() {
        let train = vec![
            row(7, 0, 50, 6),
            row(7, 1, 50, 10),
            row(7, 2, 50, 7),
            row(7, 3, 50, 9),
            row(7, 0, 51, 100),
        ];
        let model = BaselineEstimator.fit(&train);
        let test = vec![row(7, 4, 50, 3)];
        assert_eq!(CalendarSlot::of(test[0].hour_timestamp).hour_of_week, 50);

        let (predictions, coverage) = model.predict(&test);
        assert_eq!(predictions, vec![Some(8.0)]);
        assert_eq!(coverage.slot, 1);
    }

    #[test]
    fn unobserved_slot_falls_back_to_zone_mean() {
        let train = vec![row(7, 0, 10, 4), row(7, 0, 11, 8)];
        let model = BaselineEstimator.fit(&train);
        let (prediction, source) = model.predict_slot(7, 99);
        assert_eq!(prediction, Some(6.0));
        assert_eq!(source, BaselineSource::ZoneMean);
    }

    #[test]
    fn unseen_zone_is_missing_not_zero() {
        let train = vec![row(7, 0, 10, 4)];
        let model = BaselineEstimator.fit(&train);
        let test = vec![row(7, 1, 10, 5), row(7, 1, 12, 5), row(8, 1, 10, 5)];
        let (predictions, coverage) = model.predict(&test);
        assert_eq!(predictions, vec![Some(4.0), Some(4.0), None]);
        assert_eq!(
            coverage,
            BaselineCoverage {
                slot: 1,
                zone_mean: 1,
                unseen: 1,
            }
        );
    }

    #[test]
    fn slot_precedes_zone_mean() {
        let train = vec![row(7, 0, 10, 100), row(7, 0, 11, 0), row(7, 0, 12, 0)];
        let model = BaselineEstimator.fit(&train);
        let (prediction, source) = model.predict_slot(7, 10);
        assert_eq!(prediction, Some(100.0));
        assert_eq!(source, BaselineSource::Slot);
    }

    #[test]
    fn empty_training_predicts_nothing() {
        let model = BaselineEstimator.fit::<DemandRecord>(&[]);
        let (predictions, coverage) = model.predict(&[row(1, 0, 0, 1)]);
        assert_eq!(predictions, vec![None]);
        assert_eq!(coverage.unseen, 1);
    }
}
