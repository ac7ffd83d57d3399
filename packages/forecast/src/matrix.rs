//! Dense, row-major feature matrix handed to a [`Regressor`](crate::Regressor).

use taxi_demand_features_models::{FeatureRecord, MODEL_FEATURES};

use crate::ForecastError;

/// How a regressor should treat a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Ordered numeric values.
    Numeric,
    /// Unordered integer codes.
    Categorical,
}

/// Named columns of `f64` values. `NaN` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    values: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Creates a matrix from column definitions and row-major values.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::DimensionMismatch`] if `values` is not a
    /// whole number of rows, or [`ForecastError::Configuration`] if there
    /// are no columns.
    pub fn new(columns: Vec<(String, ColumnKind)>, values: Vec<f64>) -> Result<Self, ForecastError> {
        if columns.is_empty() {
            return Err(ForecastError::Configuration {
                message: "a feature matrix needs at least one column".to_string(),
            });
        }
        let n_cols = columns.len();
        if values.len() % n_cols != 0 {
            return Err(ForecastError::DimensionMismatch {
                expected: values.len().div_ceil(n_cols) * n_cols,
                actual: values.len(),
            });
        }
        let (columns, kinds) = columns.into_iter().unzip();
        Ok(Self {
            columns,
            kinds,
            n_rows: values.len() / n_cols,
            values,
        })
    }

    /// Builds the model matrix from feature records: `zone_id` as a
    /// categorical column followed by the numeric features.
    #[must_use]
    pub fn from_features(records: &[FeatureRecord]) -> Self {
        let mut values = Vec::with_capacity(records.len() * MODEL_FEATURES.len());
        for record in records {
            values.push(f64::from(record.zone_id));
            values.extend(record.numeric_features());
        }
        let kinds = MODEL_FEATURES
            .iter()
            .map(|&name| {
                if name == "zone_id" {
                    ColumnKind::Categorical
                } else {
                    ColumnKind::Numeric
                }
            })
            .collect();
        Self {
            columns: MODEL_FEATURES.iter().map(|&name| name.to_string()).collect(),
            kinds,
            values,
            n_rows: records.len(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Kind of column `col`.
    #[must_use]
    pub fn kind(&self, col: usize) -> ColumnKind {
        self.kinds[col]
    }

    /// Index of the column called `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (`row`, `col`).
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.columns.len() + col]
    }

    /// All values of one row.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        let n = self.columns.len();
        &self.values[row * n..(row + 1) * n]
    }
}
