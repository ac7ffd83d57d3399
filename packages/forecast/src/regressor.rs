//! The forecast model capability.
//!
//! The pipeline fits and predicts only through these traits, so any
//! regressor that can consume a [`FeatureMatrix`] can stand in for the
//! bundled [`GradientBoostedTrees`](crate::GradientBoostedTrees).

use crate::{FeatureMatrix, ForecastError};

/// An untrained model plus its hyperparameters.
pub trait Regressor {
    /// The trained model produced by [`Regressor::fit`].
    type Fitted: FittedRegressor;

    /// Fits a model on `features` against `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError`] if `target` does not have one value per
    /// row or the model cannot be trained on the input.
    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<Self::Fitted, ForecastError>;
}

/// A trained model.
pub trait FittedRegressor {
    /// Predicts one value per row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Schema`] if a column the model was fitted
    /// on is absent from `features`.
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ForecastError>;

    /// Per-column importance, highest first.
    fn feature_importance(&self) -> Vec<(String, u64)>;
}
