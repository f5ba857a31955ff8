//! Extremity-gated blend of the ensemble and linear regressors
//!
//! Bagged trees cannot extrapolate past the values seen during fitting, so
//! rows that fall outside the training bounds are progressively handed to
//! the linear model:
//! - `extremity < minor`: ensemble only
//! - `minor <= extremity < major`: 0.7 ensemble + 0.3 linear
//! - `extremity >= major`: linear only

use super::extremity::extremity;
use super::output::{categorize, out_of_range_fields, OutOfRangeField};
use super::Regressor;
use crate::error::{IkuError, Result};
use crate::models::{Category, FeatureVector, TrainingBounds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ensemble weight in the blended regime
pub const ENSEMBLE_WEIGHT: f64 = 0.7;

/// Linear weight in the blended regime
pub const LINEAR_WEIGHT: f64 = 0.3;

/// Extremity thresholds separating the three regimes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub minor: f64,
    pub major: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            minor: 0.1,
            major: 0.3,
        }
    }
}

impl Thresholds {
    pub fn new(minor: f64, major: f64) -> Result<Self> {
        let thresholds = Self { minor, major };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.minor.is_finite() || !self.major.is_finite() {
            return Err(IkuError::InvalidParameter(
                "thresholds must be finite".to_string(),
            ));
        }
        if self.minor < 0.0 || self.minor > self.major {
            return Err(IkuError::InvalidParameter(format!(
                "thresholds must satisfy 0 <= minor <= major, got minor={} major={}",
                self.minor, self.major
            )));
        }
        Ok(())
    }
}

/// Whether the linear fallback takes part in predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Gate between ensemble and linear model by extremity
    #[default]
    Hybrid,
    /// Always use the ensemble; extremity is still reported
    EnsembleOnly,
}

/// Which model(s) produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Ensemble,
    Blended,
    Linear,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Ensemble => "ensemble",
            Regime::Blended => "blended",
            Regime::Linear => "linear",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full result of one hybrid prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub value: f64,
    pub extremity: f64,
    pub regime: Regime,
    pub category: Category,
    pub out_of_range: Vec<OutOfRangeField>,
}

/// Hybrid predictor over a fitted ensemble and an optional linear fallback
pub struct HybridPredictor {
    ensemble: Arc<dyn Regressor>,
    linear: Option<Arc<dyn Regressor>>,
    bounds: TrainingBounds,
    thresholds: Thresholds,
    mode: BlendMode,
    ensemble_count: AtomicU64,
    blended_count: AtomicU64,
    linear_count: AtomicU64,
}

impl HybridPredictor {
    /// Build a predictor.
    ///
    /// A `Hybrid` request without a linear model falls back to
    /// `EnsembleOnly`.
    pub fn new(
        ensemble: Arc<dyn Regressor>,
        linear: Option<Arc<dyn Regressor>>,
        bounds: TrainingBounds,
        thresholds: Thresholds,
        mode: BlendMode,
    ) -> Result<Self> {
        bounds.validate()?;
        thresholds.validate()?;

        let mode = match (mode, linear.is_some()) {
            (BlendMode::Hybrid, false) => {
                warn!("No linear model available, predicting with the ensemble only");
                BlendMode::EnsembleOnly
            }
            (mode, _) => mode,
        };

        Ok(Self {
            ensemble,
            linear,
            bounds,
            thresholds,
            mode,
            ensemble_count: AtomicU64::new(0),
            blended_count: AtomicU64::new(0),
            linear_count: AtomicU64::new(0),
        })
    }

    pub fn bounds(&self) -> &TrainingBounds {
        &self.bounds
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    /// Regime selected for a given extremity. Both boundaries are half-open.
    pub fn regime_for(&self, extremity: f64) -> Regime {
        if self.mode == BlendMode::EnsembleOnly || extremity < self.thresholds.minor {
            Regime::Ensemble
        } else if extremity < self.thresholds.major {
            Regime::Blended
        } else {
            Regime::Linear
        }
    }

    /// Predict the IKU for one feature vector
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        self.predict_detailed(features).map(|outcome| outcome.value)
    }

    /// Predict and report extremity, regime, category and out-of-range fields
    pub fn predict_detailed(&self, features: &FeatureVector) -> Result<PredictionOutcome> {
        features.validate()?;
        let row = features.to_array();
        let extremity = extremity(&row, &self.bounds)?;
        let regime = self.regime_for(extremity);

        let value = match regime {
            Regime::Ensemble => self.ensemble.predict(&row),
            Regime::Blended => {
                ENSEMBLE_WEIGHT * self.ensemble.predict(&row)
                    + LINEAR_WEIGHT * self.linear_model()?.predict(&row)
            }
            Regime::Linear => self.linear_model()?.predict(&row),
        };

        self.counter(regime).fetch_add(1, Ordering::Relaxed);
        debug!(extremity, regime = %regime, value, "Hybrid prediction completed");

        Ok(PredictionOutcome {
            value,
            extremity,
            regime,
            category: categorize(value),
            out_of_range: out_of_range_fields(&row, &self.bounds),
        })
    }

    fn linear_model(&self) -> Result<&dyn Regressor> {
        self.linear
            .as_deref()
            .ok_or_else(|| IkuError::ModelUnavailable("linear model not loaded".to_string()))
    }

    fn counter(&self, regime: Regime) -> &AtomicU64 {
        match regime {
            Regime::Ensemble => &self.ensemble_count,
            Regime::Blended => &self.blended_count,
            Regime::Linear => &self.linear_count,
        }
    }

    /// Get per-regime prediction counts
    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            ensemble: self.ensemble_count.load(Ordering::Relaxed),
            blended: self.blended_count.load(Ordering::Relaxed),
            linear: self.linear_count.load(Ordering::Relaxed),
        }
    }
}

/// Per-regime prediction counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InferenceStats {
    pub ensemble: u64,
    pub blended: u64,
    pub linear: u64,
}

impl InferenceStats {
    pub fn total(&self) -> u64 {
        self.ensemble + self.blended + self.linear
    }
}
