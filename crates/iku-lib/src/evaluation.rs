//! Regression metrics, hot-test reports and feature correlation

use crate::error::{IkuError, Result};
use crate::models::{Category, ProvinceRecord, FEATURE_COLUMNS, NUM_FEATURES};
use crate::predictor::{HybridPredictor, Regime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Coefficient of determination.
///
/// A constant target scores 1.0 when predicted exactly, 0.0 otherwise.
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    mse.sqrt()
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Mean absolute percentage error, in percent. Rows with a zero actual
/// value are skipped.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let terms: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| ((a - p) / a).abs())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    100.0 * terms.iter().sum::<f64>() / terms.len() as f64
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.is_empty() {
        return Err(IkuError::InvalidParameter(
            "cannot compute metrics on zero rows".to_string(),
        ));
    }
    if actual.len() != predicted.len() {
        return Err(IkuError::InvalidParameter(format!(
            "actual ({}) and predicted ({}) differ in length",
            actual.len(),
            predicted.len()
        )));
    }
    Ok(())
}

/// Metrics of the train/test split, stored in the model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub r2_train: f64,
    pub r2_test: f64,
    pub rmse_test: f64,
    pub mape_test: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot: Option<HotMetrics>,
}

/// Metrics on the held-out hot-test year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HotMetrics {
    pub r2_hot: f64,
    pub rmse_hot: f64,
    pub mae_hot: f64,
    pub mape_hot: f64,
}

impl HotMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        check_lengths(actual, predicted)?;
        Ok(Self {
            r2_hot: r2(actual, predicted),
            rmse_hot: rmse(actual, predicted),
            mae_hot: mae(actual, predicted),
            mape_hot: mape(actual, predicted),
        })
    }
}

/// One province in a hot-test report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotTestRow {
    pub province: String,
    pub prediction: f64,
    pub category: Category,
    pub extremity: f64,
    pub regime: Regime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
    /// `|actual - prediction|`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_error: Option<f64>,
    /// `actual - prediction`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

/// Hybrid predictions over a set of provinces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotTestReport {
    pub rows: Vec<HotTestRow>,
    /// Present when at least one record carries an actual value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HotMetrics>,
}

impl HotTestReport {
    /// Predict every record. Metrics cover the records with an actual value.
    pub fn build(predictor: &HybridPredictor, records: &[ProvinceRecord]) -> Result<Self> {
        let mut rows = Vec::with_capacity(records.len());
        let mut actuals = Vec::new();
        let mut predictions = Vec::new();

        for record in records {
            let outcome = predictor.predict_detailed(&record.features)?;
            if let Some(actual) = record.actual {
                actuals.push(actual);
                predictions.push(outcome.value);
            }
            rows.push(HotTestRow {
                province: record.province.clone(),
                prediction: outcome.value,
                category: outcome.category,
                extremity: outcome.extremity,
                regime: outcome.regime,
                actual: record.actual,
                abs_error: record.actual.map(|a| (a - outcome.value).abs()),
                error: record.actual.map(|a| a - outcome.value),
            });
        }

        let metrics = if actuals.is_empty() {
            None
        } else {
            Some(HotMetrics::compute(&actuals, &predictions)?)
        };

        Ok(Self { rows, metrics })
    }

    /// Highest `n` predictions, best first
    pub fn top(&self, n: usize) -> Vec<&HotTestRow> {
        let mut sorted = self.sorted_descending();
        sorted.truncate(n);
        sorted
    }

    /// Lowest `n` predictions, worst first
    pub fn bottom(&self, n: usize) -> Vec<&HotTestRow> {
        let mut sorted = self.sorted_descending();
        sorted.reverse();
        sorted.truncate(n);
        sorted
    }

    pub fn predictions(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.prediction).collect()
    }

    fn sorted_descending(&self) -> Vec<&HotTestRow> {
        let mut sorted: Vec<&HotTestRow> = self.rows.iter().collect();
        sorted.sort_by(|a, b| b.prediction.total_cmp(&a.prediction));
        sorted
    }
}

/// Pearson correlation over the four features and the prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// Label of the prediction column in the correlation matrix
pub const PREDICTION_LABEL: &str = "Prediksi_IKU";

/// Pairwise Pearson correlation of the feature columns and `predictions`.
///
/// A zero-variance column correlates 0.0 with everything but itself.
pub fn correlation_matrix(
    rows: &[[f64; NUM_FEATURES]],
    predictions: &[f64],
) -> Result<CorrelationMatrix> {
    if rows.len() < 2 {
        return Err(IkuError::InvalidParameter(
            "correlation needs at least two rows".to_string(),
        ));
    }
    if rows.len() != predictions.len() {
        return Err(IkuError::InvalidParameter(format!(
            "rows ({}) and predictions ({}) differ in length",
            rows.len(),
            predictions.len()
        )));
    }

    let mut columns: Vec<Vec<f64>> = (0..NUM_FEATURES)
        .map(|j| rows.iter().map(|r| r[j]).collect())
        .collect();
    columns.push(predictions.to_vec());

    let k = columns.len();
    let mut values = vec![vec![0.0; k]; k];
    for a in 0..k {
        values[a][a] = 1.0;
        for b in (a + 1)..k {
            let r = pearson(&columns[a], &columns[b]);
            values[a][b] = r;
            values[b][a] = r;
        }
    }

    let mut labels: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
    labels.push(PREDICTION_LABEL.to_string());

    Ok(CorrelationMatrix { labels, values })
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Rank `(label, importance)` pairs from most to least important
pub fn rank_importances(importances: &[f64; NUM_FEATURES]) -> Vec<(&'static str, f64)> {
    let mut ranked: Vec<(&'static str, f64)> = FEATURE_COLUMNS
        .iter()
        .copied()
        .zip(importances.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureVector, TrainingBounds};
    use crate::predictor::{BlendMode, Regressor, Thresholds};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    struct FirstFeature;

    impl Regressor for FirstFeature {
        fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
            features[0]
        }
    }

    fn predictor() -> HybridPredictor {
        HybridPredictor::new(
            Arc::new(FirstFeature),
            None,
            TrainingBounds::new([0.0; NUM_FEATURES], [100.0; NUM_FEATURES]).unwrap(),
            Thresholds::default(),
            BlendMode::EnsembleOnly,
        )
        .unwrap()
    }

    fn record(province: &str, value: f64, actual: Option<f64>) -> ProvinceRecord {
        ProvinceRecord {
            province: province.to_string(),
            features: FeatureVector::new(value, 10.0, 10.0, 10.0),
            actual,
        }
    }

    #[test]
    fn test_basic_metrics() {
        let actual = [3.0, -0.5, 2.0, 7.0];
        let predicted = [2.5, 0.0, 2.0, 8.0];
        assert_relative_eq!(r2(&actual, &predicted), 0.948_608_137, epsilon = 1e-6);
        assert_relative_eq!(mae(&actual, &predicted), 0.5);
        assert_relative_eq!(rmse(&actual, &predicted), 0.375_f64.sqrt());
    }

    #[test]
    fn test_mape_skips_zero_actuals() {
        let actual = [0.0, 50.0, 100.0];
        let predicted = [5.0, 55.0, 90.0];
        // (10% + 10%) / 2
        assert_relative_eq!(mape(&actual, &predicted), 10.0);
        assert_eq!(mape(&[0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_r2_constant_target() {
        assert_eq!(r2(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
    }

    #[test]
    fn test_hot_metrics_rejects_bad_lengths() {
        assert!(HotMetrics::compute(&[], &[]).is_err());
        assert!(HotMetrics::compute(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_report_rows_and_rankings() {
        let records = vec![
            record("Aceh", 80.0, Some(82.0)),
            record("Bali", 95.0, Some(90.0)),
            record("Jambi", 40.0, None),
            record("Riau", 60.0, Some(60.0)),
        ];
        let report = HotTestReport::build(&predictor(), &records).unwrap();

        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.rows[0].error, Some(2.0));
        assert_eq!(report.rows[1].abs_error, Some(5.0));
        assert_eq!(report.rows[1].category, Category::SangatBaik);
        assert_eq!(report.rows[2].actual, None);

        let metrics = report.metrics.unwrap();
        assert_relative_eq!(metrics.mae_hot, 7.0 / 3.0);

        let top: Vec<&str> = report.top(2).iter().map(|r| r.province.as_str()).collect();
        assert_eq!(top, vec!["Bali", "Aceh"]);
        let bottom: Vec<&str> = report.bottom(2).iter().map(|r| r.province.as_str()).collect();
        assert_eq!(bottom, vec!["Jambi", "Riau"]);
        assert_eq!(report.top(10).len(), 4);
    }

    #[test]
    fn test_report_without_actuals_has_no_metrics() {
        let report = HotTestReport::build(&predictor(), &[record("Aceh", 50.0, None)]).unwrap();
        assert!(report.metrics.is_none());
    }

    #[test]
    fn test_correlation_matrix() {
        let rows = vec![
            [1.0, 10.0, 5.0, 3.0],
            [2.0, 8.0, 5.0, 1.0],
            [3.0, 6.0, 5.0, 4.0],
        ];
        let predictions = vec![2.0, 4.0, 6.0];
        let matrix = correlation_matrix(&rows, &predictions).unwrap();

        assert_eq!(matrix.labels.len(), 5);
        assert_eq!(matrix.labels[4], PREDICTION_LABEL);
        assert_relative_eq!(matrix.values[0][4], 1.0, epsilon = 1e-12);
        assert_relative_eq!(matrix.values[0][1], -1.0, epsilon = 1e-12);
        assert_eq!(matrix.values[2][0], 0.0);
        assert_eq!(matrix.values[2][2], 1.0);
        assert_eq!(matrix.values[1][3], matrix.values[3][1]);
    }

    #[test]
    fn test_rank_importances() {
        let ranked = rank_importances(&[0.1, 0.2, 0.6, 0.1]);
        assert_eq!(ranked[0].0, "Kendaraan_Bermotor");
        assert_eq!(ranked[1].0, "Karhutla_(ha)");
    }
}
