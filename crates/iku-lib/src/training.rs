//! Offline training pipeline
//!
//! Bounds come from the original rows only. A preliminary forest fitted on
//! the train split labels the augmented rows, the final forest learns from
//! train plus augmented rows, and the linear fallback sees the original
//! train split so its slope is not flattened by forest-labeled points.

use crate::artifact::{ModelArtifact, FORMAT_VERSION};
use crate::augment::{augment, AugmentParams};
use crate::dataset::labeled_rows;
use crate::error::{IkuError, Result};
use crate::evaluation::{mape, r2, rmse, EvaluationMetrics, HotTestReport};
use crate::model::{ForestParams, LinearRegression, RandomForestRegressor};
use crate::models::{FeatureVector, ProvinceRecord, TrainingBounds, NUM_FEATURES};
use crate::predictor::{BlendMode, HybridPredictor, Regressor, Thresholds};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub forest: ForestParams,
    /// `None` trains the final forest on the original rows only
    pub augmentation: Option<AugmentParams>,
    pub test_fraction: f64,
    pub split_seed: u64,
    pub thresholds: Thresholds,
    pub fit_linear: bool,
    pub model_version: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            augmentation: Some(AugmentParams::default()),
            test_fraction: 0.2,
            split_seed: 42,
            thresholds: Thresholds::default(),
            fit_linear: true,
            model_version: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        self.forest.validate()?;
        self.thresholds.validate()?;
        if let Some(params) = &self.augmentation {
            params.validate()?;
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(IkuError::InvalidParameter(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    /// Present when hot-test records were supplied
    pub hot_report: Option<HotTestReport>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub augmented_rows: usize,
}

pub struct Trainer;

impl Trainer {
    pub fn train(
        records: &[ProvinceRecord],
        hot_records: Option<&[ProvinceRecord]>,
        config: &TrainingConfig,
    ) -> Result<TrainingOutcome> {
        config.validate()?;
        let (x, y) = labeled_rows(records)?;
        let bounds = TrainingBounds::from_rows(&x)?;

        let (train_idx, test_idx) = split_indices(x.len(), config.test_fraction, config.split_seed)?;
        let (x_train, y_train) = select(&x, &y, &train_idx);
        let (x_test, y_test) = select(&x, &y, &test_idx);
        info!(
            rows = x.len(),
            train_rows = x_train.len(),
            test_rows = x_test.len(),
            "Starting training"
        );

        let mut fit_x = x_train.clone();
        let mut fit_y = y_train.clone();
        let mut augmented_rows = 0;
        if let Some(params) = &config.augmentation {
            let preliminary = RandomForestRegressor::fit(&x_train, &y_train, config.forest.clone())?;
            let augmented = augment(&x_train, &y_train, Some(&preliminary as &dyn Regressor), params)?;
            augmented_rows = augmented.len();
            fit_x.extend(augmented.features);
            fit_y.extend(augmented.targets);
            debug!(augmented_rows, "Augmented rows added to the training set");
        }

        let ensemble = RandomForestRegressor::fit(&fit_x, &fit_y, config.forest.clone())?;
        let linear = if config.fit_linear {
            Some(LinearRegression::fit(&x_train, &y_train)?)
        } else {
            None
        };

        let predictor = HybridPredictor::new(
            Arc::new(ensemble.clone()) as Arc<dyn Regressor>,
            linear
                .clone()
                .map(|model| Arc::new(model) as Arc<dyn Regressor>),
            bounds.clone(),
            config.thresholds,
            BlendMode::Hybrid,
        )?;

        let train_pred = predict_rows(&predictor, &x_train)?;
        let test_pred = predict_rows(&predictor, &x_test)?;
        let hot_report = hot_records
            .map(|hot| HotTestReport::build(&predictor, hot))
            .transpose()?;

        let evaluation = EvaluationMetrics {
            r2_train: r2(&y_train, &train_pred),
            r2_test: r2(&y_test, &test_pred),
            rmse_test: rmse(&y_test, &test_pred),
            mape_test: mape(&y_test, &test_pred),
            hot: hot_report.as_ref().and_then(|report| report.metrics),
        };

        let trained_at = Utc::now();
        let model_version = config
            .model_version
            .clone()
            .unwrap_or_else(|| format!("iku-{}", trained_at.format("%Y%m%d%H%M%S")));

        let artifact = ModelArtifact {
            format_version: FORMAT_VERSION,
            model_version,
            trained_at,
            feature_importances: ensemble.feature_importances(),
            ensemble,
            linear,
            bounds,
            evaluation: Some(evaluation),
            augmentation: config.augmentation.clone(),
            training_rows: x.len(),
        };

        Ok(TrainingOutcome {
            artifact,
            hot_report,
            train_rows: x_train.len(),
            test_rows: x_test.len(),
            augmented_rows,
        })
    }
}

/// Seeded shuffle, then the first `round(n * test_fraction)` rows form the test split
fn split_indices(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = ((n as f64) * test_fraction).round().max(1.0) as usize;
    if n < n_test + 2 {
        return Err(IkuError::Training(format!(
            "need at least {} labeled rows for a {} test split, got {}",
            n_test + 2,
            test_fraction,
            n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

fn select(
    x: &[[f64; NUM_FEATURES]],
    y: &[f64],
    indices: &[usize],
) -> (Vec<[f64; NUM_FEATURES]>, Vec<f64>) {
    indices.iter().map(|&i| (x[i], y[i])).unzip()
}

fn predict_rows(predictor: &HybridPredictor, rows: &[[f64; NUM_FEATURES]]) -> Result<Vec<f64>> {
    rows.iter()
        .map(|row| predictor.predict(&FeatureVector::from_array(*row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<ProvinceRecord> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                let features = FeatureVector::new(
                    40.0 + (t * 7.0) % 55.0,
                    (t * 1234.0) % 20_000.0,
                    150_000.0 + t * 90_000.0,
                    60.0 + (t * 3.0) % 40.0,
                );
                let actual = 30.0 + 0.5 * features.land_cover_quality
                    - features.motor_vehicles / 1_000_000.0
                    + 0.1 * features.grid_electricity_pct;
                ProvinceRecord {
                    province: format!("Provinsi {}", i),
                    features,
                    actual: Some(actual),
                }
            })
            .collect()
    }

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            forest: ForestParams {
                n_trees: 10,
                ..ForestParams::default()
            },
            augmentation: Some(AugmentParams {
                n_samples: 60,
                ..AugmentParams::default()
            }),
            model_version: Some("test".to_string()),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_train_produces_valid_artifact() {
        let data = records(40);
        let outcome = Trainer::train(&data, None, &fast_config()).unwrap();

        assert_eq!(outcome.train_rows, 32);
        assert_eq!(outcome.test_rows, 8);
        assert_eq!(outcome.augmented_rows, 60);

        let artifact = &outcome.artifact;
        artifact.validate().unwrap();
        assert_eq!(artifact.model_version, "test");
        assert_eq!(artifact.training_rows, 40);
        assert!(artifact.linear.is_some());

        let rows: Vec<[f64; NUM_FEATURES]> =
            data.iter().map(|r| r.features.to_array()).collect();
        assert_eq!(artifact.bounds, TrainingBounds::from_rows(&rows).unwrap());

        let evaluation = artifact.evaluation.as_ref().unwrap();
        assert!(evaluation.r2_train > 0.5);
        assert!(evaluation.hot.is_none());
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = records(30);
        let a = Trainer::train(&data, None, &fast_config()).unwrap();
        let b = Trainer::train(&data, None, &fast_config()).unwrap();
        assert_eq!(a.artifact.ensemble, b.artifact.ensemble);
        assert_eq!(a.artifact.linear, b.artifact.linear);
        assert_eq!(a.artifact.evaluation, b.artifact.evaluation);
    }

    #[test]
    fn test_hot_records_produce_report() {
        let data = records(30);
        let hot = records(5);
        let outcome = Trainer::train(&data, Some(hot.as_slice()), &fast_config()).unwrap();

        let report = outcome.hot_report.unwrap();
        assert_eq!(report.rows.len(), 5);
        let evaluation = outcome.artifact.evaluation.unwrap();
        assert_eq!(evaluation.hot, report.metrics);
        assert!(evaluation.hot.is_some());
    }

    #[test]
    fn test_without_augmentation_or_linear() {
        let config = TrainingConfig {
            augmentation: None,
            fit_linear: false,
            ..fast_config()
        };
        let outcome = Trainer::train(&records(20), None, &config).unwrap();
        assert_eq!(outcome.augmented_rows, 0);
        assert!(outcome.artifact.linear.is_none());
    }

    #[test]
    fn test_unlabeled_records_rejected() {
        let mut data = records(10);
        data[4].actual = None;
        assert!(matches!(
            Trainer::train(&data, None, &fast_config()),
            Err(IkuError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_too_few_rows() {
        assert!(matches!(
            Trainer::train(&records(2), None, &fast_config()),
            Err(IkuError::Training(_))
        ));
    }

    #[test]
    fn test_invalid_test_fraction() {
        let config = TrainingConfig {
            test_fraction: 1.0,
            ..fast_config()
        };
        assert!(matches!(
            Trainer::train(&records(10), None, &config),
            Err(IkuError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let (train, test) = split_indices(34, 0.2, 42).unwrap();
        assert_eq!(test.len(), 7);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..34).collect::<Vec<_>>());
    }
}
