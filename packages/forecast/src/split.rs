//! Chronological train/test splitting.

use chrono::TimeDelta;
use taxi_demand_forecast_models::{SplitCutoff, SplitPanel, SplitPolicy};
use taxi_demand_grid_models::PanelRow;

use crate::ForecastError;

/// Cuts a panel into train and test by time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalSplitter {
    policy: SplitPolicy,
}

impl TemporalSplitter {
    /// Creates a splitter for `policy`.
    #[must_use]
    pub const fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    /// Splits `panel`.
    ///
    /// The panel is stable-sorted by hour first, so rows sharing an hour
    /// keep their input order. Train holds the rows strictly before the
    /// cutoff and test the rows at or after it.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Configuration`] if the policy is malformed
    /// or if either side of the split would be empty.
    pub fn split<T: PanelRow>(&self, mut panel: Vec<T>) -> Result<SplitPanel<T>, ForecastError> {
        panel.sort_by_key(PanelRow::hour_timestamp);
        let len = panel.len();

        let (idx, cutoff) = match self.policy {
            SplitPolicy::Fraction { fraction } => {
                if !(fraction.is_finite() && fraction > 0.0 && fraction < 1.0) {
                    return Err(ForecastError::Configuration {
                        message: format!("split fraction must be in (0, 1), got {fraction}"),
                    });
                }
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let idx = (len as f64 * fraction).floor() as usize;
                (idx, SplitCutoff::RowIndex(idx))
            }
            SplitPolicy::TrailingDuration { hours } => {
                if hours == 0 {
                    return Err(ForecastError::Configuration {
                        message: "trailing split duration must be at least one hour".to_string(),
                    });
                }
                let Some(last) = panel.last().map(PanelRow::hour_timestamp) else {
                    return Err(empty_partition(self.policy, 0, 0));
                };
                let Some(boundary) = last.checked_sub_signed(TimeDelta::hours(i64::from(hours)))
                else {
                    return Err(ForecastError::Configuration {
                        message: format!(
                            "trailing split of {hours} hours reaches before the earliest representable date"
                        ),
                    });
                };
                let idx = panel.partition_point(|r| r.hour_timestamp() < boundary);
                (idx, SplitCutoff::Timestamp(boundary))
            }
        };

        if idx == 0 || idx >= len {
            return Err(empty_partition(self.policy, idx, len - idx.min(len)));
        }

        let test = panel.split_off(idx);
        let split = SplitPanel {
            train: panel,
            test,
            cutoff,
        };

        log::info!(
            "Split ({}) at {}: {} train rows, {} test rows",
            self.policy,
            split.cutoff,
            split.train.len(),
            split.test.len()
        );
        if let (Some(train_max), Some(test_min)) = (split.train_max_hour(), split.test_min_hour()) {
            log::info!("Train ends {train_max}, test starts {test_min}");
        }
        if split.shares_boundary_hour() {
            log::warn!(
                "Split ({}) puts the same hour in train and test; use a trailing duration for a strict temporal boundary",
                self.policy
            );
        }

        Ok(split)
    }
}

fn empty_partition(policy: SplitPolicy, train: usize, test: usize) -> ForecastError {
    ForecastError::Configuration {
        message: format!(
            "split ({policy}) leaves an empty partition: {train} train rows, {test} test rows"
        ),
    }
}
