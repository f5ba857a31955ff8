//! Ordinary least squares with intercept
//!
//! Columns are standardized before forming the normal equations so the
//! vehicle counts (1e7) and the percentages (1e2) share one scale; the
//! fitted coefficients are mapped back to original units.

use crate::error::{IkuError, Result};
use crate::models::NUM_FEATURES;
use crate::predictor::Regressor;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative pivot tolerance for the standardized system
const PIVOT_TOLERANCE: f64 = 1e-9;

/// A fitted linear regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub intercept: f64,
    pub coefficients: [f64; NUM_FEATURES],
}

impl LinearRegression {
    pub fn fit(x: &[[f64; NUM_FEATURES]], y: &[f64]) -> Result<Self> {
        if x.is_empty() {
            return Err(IkuError::Training(
                "cannot fit a linear model on an empty dataset".to_string(),
            ));
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

        let n = x.len() as f64;
        let y_mean = y.iter().sum::<f64>() / n;

        let mut mean = [0.0; NUM_FEATURES];
        let mut scale = [0.0; NUM_FEATURES];
        for j in 0..NUM_FEATURES {
            mean[j] = x.iter().map(|row| row[j]).sum::<f64>() / n;
            let var = x.iter().map(|row| (row[j] - mean[j]).powi(2)).sum::<f64>() / n;
            scale[j] = var.sqrt();
        }

        // Constant columns carry no signal; they keep a zero coefficient
        let active: Vec<usize> = (0..NUM_FEATURES)
            .filter(|&j| scale[j] > f64::EPSILON * mean[j].abs().max(1.0))
            .collect();
        let k = active.len();

        let mut coefficients = [0.0; NUM_FEATURES];
        if k > 0 {
            // Augmented normal equations [Z'Z | Z'y] on standardized columns
            let mut system = vec![vec![0.0; k + 1]; k];
            for (row, target) in x.iter().zip(y) {
                let z: Vec<f64> = active
                    .iter()
                    .map(|&j| (row[j] - mean[j]) / scale[j])
                    .collect();
                let centered = target - y_mean;
                for a in 0..k {
                    for b in 0..k {
                        system[a][b] += z[a] * z[b];
                    }
                    system[a][k] += z[a] * centered;
                }
            }

            let solution = solve(system, PIVOT_TOLERANCE * n)?;
            for (slot, &j) in active.iter().enumerate() {
                coefficients[j] = solution[slot] / scale[j];
            }
        }

        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&mean)
                .map(|(c, m)| c * m)
                .sum::<f64>();

        debug!(
            n_samples = x.len(),
            active_features = k,
            intercept,
            "Linear model fitted"
        );

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    pub fn predict_one(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(IkuError::ModelLoad(
                "linear model has non-finite coefficients".to_string(),
            ));
        }
        Ok(())
    }
}

impl Regressor for LinearRegression {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        self.predict_one(features)
    }
}

/// Gaussian elimination with partial pivoting on an augmented `k x (k+1)` matrix
fn solve(mut m: Vec<Vec<f64>>, tolerance: f64) -> Result<Vec<f64>> {
    let k = m.len();
    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() <= tolerance {
            return Err(IkuError::Training(
                "normal equations are singular (collinear features)".to_string(),
            ));
        }
        m.swap(col, pivot);

        for row in (col + 1)..k {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=k {
                m[row][c] -= factor * m[col][c];
            }
        }
    }

    let mut solution = vec![0.0; k];
    for row in (0..k).rev() {
        let tail: f64 = ((row + 1)..k).map(|c| m[row][c] * solution[c]).sum();
        solution[row] = (m[row][k] - tail) / m[row][row];
    }
    Ok(solution)
}
