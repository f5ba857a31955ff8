//! Hybrid IKU prediction engine

mod extremity;
mod hybrid;
mod output;

pub use extremity::extremity;
pub use hybrid::{
    BlendMode, HybridPredictor, InferenceStats, PredictionOutcome, Regime, Thresholds, ENSEMBLE_WEIGHT,
    LINEAR_WEIGHT,
};
pub use output::{categorize, out_of_range_fields, OutOfRangeField};

use crate::models::NUM_FEATURES;
use std::sync::Arc;

/// Trait for fitted regression models consulted by the hybrid predictor
pub trait Regressor: Send + Sync {
    /// Predict the target for a single feature row
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64;
}

impl<R: Regressor + ?Sized> Regressor for Arc<R> {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        (**self).predict(features)
    }
}

impl<R: Regressor + ?Sized> Regressor for Box<R> {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        (**self).predict(features)
    }
}
