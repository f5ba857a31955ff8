//! Bagged random forest regressor
//!
//! Each tree is grown on a bootstrap resample with its own ChaCha stream
//! (`seed`, stream = tree index), so a fitted forest depends only on the
//! data and the parameters, never on how rayon schedules the trees.
//! Prediction averages the trees; like any tree ensemble it saturates at
//! the training extremes instead of extrapolating.

use super::tree::{RegressionTree, TreeParams};
use crate::error::{IkuError, Result};
use crate::models::NUM_FEATURES;
use crate::predictor::Regressor;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of candidate features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(&self) -> usize {
        match *self {
            MaxFeatures::All => NUM_FEATURES,
            MaxFeatures::Sqrt => ((NUM_FEATURES as f64).sqrt().round() as usize).max(1),
            MaxFeatures::Count(n) => n,
        }
    }
}

/// Forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(IkuError::InvalidParameter("n_trees must be >= 1".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(IkuError::InvalidParameter(
                "min_samples_split must be >= 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(IkuError::InvalidParameter(
                "min_samples_leaf must be >= 1".to_string(),
            ));
        }
        let features = self.max_features.resolve();
        if features == 0 || features > NUM_FEATURES {
            return Err(IkuError::InvalidParameter(format!(
                "max_features must resolve to 1..={}, got {}",
                NUM_FEATURES, features
            )));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features.resolve(),
        }
    }
}

/// A fitted random forest regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    params: ForestParams,
    feature_importances: [f64; NUM_FEATURES],
}

impl RandomForestRegressor {
    /// Fit a forest on all rows of `x` / `y`
    pub fn fit(x: &[[f64; NUM_FEATURES]], y: &[f64], params: ForestParams) -> Result<Self> {
        params.validate()?;
        if x.is_empty() {
            return Err(IkuError::Training("cannot fit a forest on an empty dataset".to_string()));
        }
        if x.len() != y.len() {
            return Err(IkuError::Training(format!(
                "feature rows ({}) and targets ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
            return Err(IkuError::Training(
                "training data contains non-finite values".to_string(),
            ));
        }

        let n = x.len();
        let tree_params = params.tree_params();
        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
                rng.set_stream(t as u64);
                let sample: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, &sample, tree_params, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let feature_importances = average_importances(&trees);
        debug!(
            n_trees = trees.len(),
            n_samples = n,
            "Random forest fitted"
        );

        Ok(Self {
            trees,
            params,
            feature_importances,
        })
    }

    /// Mean prediction over all trees
    pub fn predict_one(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict_batch(&self, rows: &[[f64; NUM_FEATURES]]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_one(r)).collect()
    }

    /// Individual tree predictions for a single sample
    pub fn tree_predictions(&self, features: &[f64; NUM_FEATURES]) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(features)).collect()
    }

    /// Impurity-based importances, normalized to sum to 1
    pub fn feature_importances(&self) -> [f64; NUM_FEATURES] {
        self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Average tree depth across the forest
    pub fn avg_depth(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.depth() as f64).sum::<f64>() / self.trees.len() as f64
    }

    /// Check the structure of a deserialized forest
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(IkuError::ModelLoad("forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| match e {
                IkuError::ModelLoad(msg) => IkuError::ModelLoad(format!("tree {}: {}", i, msg)),
                other => other,
            })?;
        }
        Ok(())
    }
}

impl Regressor for RandomForestRegressor {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        self.predict_one(features)
    }
}

/// Per-tree normalized importances, averaged and renormalized
fn average_importances(trees: &[RegressionTree]) -> [f64; NUM_FEATURES] {
    let mut total = [0.0; NUM_FEATURES];
    for tree in trees {
        let decrease = tree.impurity_decrease();
        let sum: f64 = decrease.iter().sum();
        if sum > 0.0 {
            for i in 0..NUM_FEATURES {
                total[i] += decrease[i] / sum;
            }
        }
    }
    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        for value in total.iter_mut() {
            *value /= sum;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn synthetic_data(n: usize) -> (Vec<[f64; NUM_FEATURES]>, Vec<f64>) {
        let x: Vec<[f64; NUM_FEATURES]> = (0..n)
            .map(|i| {
                let t = i as f64;
                [
                    (t * 7.0) % 100.0,
                    (t * 13.0) % 50.0,
                    1000.0 + t * 250.0,
                    50.0 + (t * 3.0) % 50.0,
                ]
            })
            .collect();
        let y = x
            .iter()
            .map(|r| 40.0 + 0.4 * r[0] - 0.001 * r[2] / 10.0)
            .collect();
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 12,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let (x, y) = synthetic_data(40);
        let a = RandomForestRegressor::fit(&x, &y, small_params()).unwrap();
        let b = RandomForestRegressor::fit(&x, &y, small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_changes_forest() {
        let (x, y) = synthetic_data(40);
        let a = RandomForestRegressor::fit(&x, &y, small_params()).unwrap();
        let b = RandomForestRegressor::fit(
            &x,
            &y,
            ForestParams {
                seed: 7,
                ..small_params()
            },
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_predictions_within_target_range() {
        let (x, y) = synthetic_data(40);
        let forest = RandomForestRegressor::fit(&x, &y, small_params()).unwrap();
        let lo = y.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        // Far outside the training data the forest cannot leave the target range
        for row in [[1e6, 0.0, 1e12, 0.0], [-1e6, -1e6, -1e6, -1e6]] {
            let p = forest.predict_one(&row);
            assert!(p >= lo - 1e-9 && p <= hi + 1e-9);
        }
    }

    #[test]
    fn test_without_bootstrap_fits_training_data() {
        let (x, y) = synthetic_data(30);
        let params = ForestParams {
            n_trees: 3,
            bootstrap: false,
            ..ForestParams::default()
        };
        let forest = RandomForestRegressor::fit(&x, &y, params).unwrap();
        for (row, target) in x.iter().zip(&y) {
            assert_relative_eq!(forest.predict_one(row), *target, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_feature_importances_normalized() {
        let (x, y) = synthetic_data(40);
        let forest = RandomForestRegressor::fit(&x, &y, small_params()).unwrap();
        let importances = forest.feature_importances();
        assert_relative_eq!(importances.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(importances.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (x, y) = synthetic_data(10);
        let params = ForestParams {
            n_trees: 0,
            ..ForestParams::default()
        };
        assert!(matches!(
            RandomForestRegressor::fit(&x, &y, params),
            Err(IkuError::InvalidParameter(_))
        ));

        let params = ForestParams {
            max_features: MaxFeatures::Count(9),
            ..ForestParams::default()
        };
        assert!(RandomForestRegressor::fit(&x, &y, params).is_err());
    }

    #[test]
    fn test_non_finite_training_data_rejected() {
        let (mut x, y) = synthetic_data(10);
        x[3][1] = f64::NAN;
        assert!(matches!(
            RandomForestRegressor::fit(&x, &y, small_params()),
            Err(IkuError::Training(_))
        ));
    }

    #[test]
    fn test_serde_round_trip_preserves_predictions() {
        let (x, y) = synthetic_data(20);
        let forest = RandomForestRegressor::fit(&x, &y, small_params()).unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForestRegressor = serde_json::from_str(&json).unwrap();
        restored.validate().unwrap();
        assert_eq!(forest.predict_one(&x[5]), restored.predict_one(&x[5]));
    }
}
