//! Deterministic training-set augmentation
//!
//! Three perturbed copies of the input are produced: multiplicative noise,
//! moderate extrapolation and extreme extrapolation. The extrapolation
//! passes shift each field by a fraction of its observed range, which is
//! what pushes the ensemble to see points beyond the original hull.
//!
//! A single ChaCha8 stream seeded with `random_seed` drives every draw in a
//! fixed order, so the output is identical across runs, platforms and
//! thread counts.

use crate::error::{IkuError, Result};
use crate::models::NUM_FEATURES;
use crate::predictor::Regressor;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper limit on the number of rows a single call may emit
pub const MAX_AUGMENTED_ROWS: usize = 1_000_000;

/// Augmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentParams {
    /// Relative noise amplitude of the first pass
    pub noise_level: f64,
    /// Range fraction of the moderate extrapolation pass
    pub extrapol_frac: f64,
    /// Range fraction of the extreme extrapolation pass
    pub extreme_frac: f64,
    /// Number of rows kept after the three passes are concatenated
    pub n_samples: usize,
    pub random_seed: u64,
}

impl Default for AugmentParams {
    fn default() -> Self {
        Self {
            noise_level: 0.05,
            extrapol_frac: 0.15,
            extreme_frac: 0.3,
            n_samples: 500,
            random_seed: 42,
        }
    }
}

impl AugmentParams {
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("noise_level", self.noise_level),
            ("extrapol_frac", self.extrapol_frac),
            ("extreme_frac", self.extreme_frac),
        ];
        for (name, value) in fractions {
            if !value.is_finite() || value < 0.0 {
                return Err(IkuError::InvalidParameter(format!(
                    "{} must be a finite, non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.n_samples == 0 || self.n_samples > MAX_AUGMENTED_ROWS {
            return Err(IkuError::InvalidParameter(format!(
                "n_samples must be in 1..={}, got {}",
                MAX_AUGMENTED_ROWS, self.n_samples
            )));
        }
        Ok(())
    }
}

/// Synthetic rows and their labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AugmentedDataset {
    pub features: Vec<[f64; NUM_FEATURES]>,
    pub targets: Vec<f64>,
}

impl AugmentedDataset {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Build an augmented dataset from `x` / `y`.
///
/// When `model` is given, every synthetic row is labeled by it; otherwise
/// each row inherits the label of the original row it was derived from.
/// The result holds `min(n_samples, 3 * x.len())` rows.
pub fn augment(
    x: &[[f64; NUM_FEATURES]],
    y: &[f64],
    model: Option<&dyn Regressor>,
    params: &AugmentParams,
) -> Result<AugmentedDataset> {
    params.validate()?;
    if x.is_empty() {
        return Err(IkuError::InvalidParameter(
            "cannot augment an empty dataset".to_string(),
        ));
    }
    if x.len() != y.len() {
        return Err(IkuError::InvalidParameter(format!(
            "feature rows ({}) and targets ({}) differ in length",
            x.len(),
            y.len()
        )));
    }
    if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
        return Err(IkuError::InvalidParameter(
            "augmentation input contains non-finite values".to_string(),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.random_seed);
    let range = feature_range(x);

    let noise: Vec<[f64; NUM_FEATURES]> = x
        .iter()
        .map(|row| {
            let mut out = *row;
            for value in out.iter_mut() {
                *value *= 1.0 + symmetric(&mut rng, params.noise_level);
            }
            out
        })
        .collect();
    let moderate = shift_by_range(x, &range, params.extrapol_frac, &mut rng);
    let extreme = shift_by_range(x, &range, params.extreme_frac, &mut rng);

    let mut features = Vec::with_capacity(3 * x.len());
    let mut targets = Vec::with_capacity(3 * x.len());
    for pass in [noise, moderate, extreme] {
        targets.extend(label(&pass, y, model));
        features.extend(pass);
    }

    let total = features.len();
    if params.n_samples < total {
        let picked = index::sample(&mut rng, total, params.n_samples);
        let (features, targets): (Vec<_>, Vec<_>) = picked
            .iter()
            .map(|i| (features[i], targets[i]))
            .unzip();
        debug!(
            input_rows = x.len(),
            output_rows = params.n_samples,
            relabeled = model.is_some(),
            "Augmented dataset subsampled"
        );
        return Ok(AugmentedDataset { features, targets });
    }

    debug!(
        input_rows = x.len(),
        output_rows = total,
        relabeled = model.is_some(),
        "Augmented dataset built"
    );
    Ok(AugmentedDataset { features, targets })
}

/// Uniform draw in `[-frac, frac)`, one RNG draw regardless of `frac`
fn symmetric(rng: &mut ChaCha8Rng, frac: f64) -> f64 {
    let u: f64 = rng.gen();
    -frac + 2.0 * frac * u
}

fn shift_by_range(
    x: &[[f64; NUM_FEATURES]],
    range: &[f64; NUM_FEATURES],
    frac: f64,
    rng: &mut ChaCha8Rng,
) -> Vec<[f64; NUM_FEATURES]> {
    x.iter()
        .map(|row| {
            let mut out = *row;
            for (value, width) in out.iter_mut().zip(range) {
                *value += symmetric(rng, frac) * width;
            }
            out
        })
        .collect()
}

fn label(rows: &[[f64; NUM_FEATURES]], y: &[f64], model: Option<&dyn Regressor>) -> Vec<f64> {
    match model {
        Some(model) => rows.par_iter().map(|row| model.predict(row)).collect(),
        None => y.to_vec(),
    }
}

fn feature_range(x: &[[f64; NUM_FEATURES]]) -> [f64; NUM_FEATURES] {
    let mut range = [0.0; NUM_FEATURES];
    for (j, width) in range.iter_mut().enumerate() {
        let (lo, hi) = x.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
            (lo.min(row[j]), hi.max(row[j]))
        });
        *width = hi - lo;
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct SumModel;

    impl Regressor for SumModel {
        fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
            features.iter().sum()
        }
    }

    fn sample_data(n: usize) -> (Vec<[f64; NUM_FEATURES]>, Vec<f64>) {
        let x = (0..n)
            .map(|i| {
                let t = i as f64;
                [60.0 + t, 100.0 * t, 150_000.0 + 1000.0 * t, 80.0 + t / 10.0]
            })
            .collect();
        let y = (0..n).map(|i| 70.0 + i as f64).collect();
        (x, y)
    }

    #[test]
    fn test_same_seed_is_identical() {
        let (x, y) = sample_data(34);
        let params = AugmentParams::default();
        let a = augment(&x, &y, None, &params).unwrap();
        let b = augment(&x, &y, None, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_differs() {
        let (x, y) = sample_data(34);
        let a = augment(&x, &y, None, &AugmentParams::default()).unwrap();
        let b = augment(
            &x,
            &y,
            None,
            &AugmentParams {
                random_seed: 43,
                ..AugmentParams::default()
            },
        )
        .unwrap();
        assert_ne!(a.features, b.features);
    }

    #[test]
    fn test_output_size_is_capped_by_three_passes() {
        let (x, y) = sample_data(34);
        let all = augment(&x, &y, None, &AugmentParams::default()).unwrap();
        assert_eq!(all.len(), 102);

        let subset = augment(
            &x,
            &y,
            None,
            &AugmentParams {
                n_samples: 50,
                ..AugmentParams::default()
            },
        )
        .unwrap();
        assert_eq!(subset.len(), 50);
        assert_eq!(subset.features.len(), 50);
    }

    #[test]
    fn test_zero_fractions_copy_input() {
        let (x, y) = sample_data(5);
        let params = AugmentParams {
            noise_level: 0.0,
            extrapol_frac: 0.0,
            extreme_frac: 0.0,
            ..AugmentParams::default()
        };
        let out = augment(&x, &y, None, &params).unwrap();
        assert_eq!(out.len(), 15);
        for pass in 0..3 {
            assert_eq!(&out.features[pass * 5..pass * 5 + 5], x.as_slice());
            assert_eq!(&out.targets[pass * 5..pass * 5 + 5], y.as_slice());
        }
    }

    #[test]
    fn test_noise_pass_stays_within_relative_band() {
        let (x, y) = sample_data(10);
        let params = AugmentParams {
            noise_level: 0.05,
            n_samples: 1000,
            ..AugmentParams::default()
        };
        let out = augment(&x, &y, None, &params).unwrap();
        for (noisy, original) in out.features[..10].iter().zip(&x) {
            for j in 0..NUM_FEATURES {
                assert!((noisy[j] - original[j]).abs() <= 0.05 * original[j].abs() + 1e-9);
            }
        }
    }

    #[test]
    fn test_extreme_pass_reaches_beyond_range() {
        let (x, y) = sample_data(34);
        let params = AugmentParams {
            n_samples: 1000,
            ..AugmentParams::default()
        };
        let out = augment(&x, &y, None, &params).unwrap();
        let max_vehicles = x.iter().map(|r| r[2]).fold(f64::MIN, f64::max);
        assert!(out.features[68..].iter().any(|r| r[2] > max_vehicles));
    }

    #[test]
    fn test_model_relabels_rows() {
        let (x, y) = sample_data(8);
        let out = augment(&x, &y, Some(&SumModel as &dyn Regressor), &AugmentParams::default()).unwrap();
        for (row, target) in out.features.iter().zip(&out.targets) {
            assert_relative_eq!(*target, row.iter().sum::<f64>());
        }
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let (x, y) = sample_data(4);
        let bad = [
            AugmentParams {
                noise_level: -0.1,
                ..AugmentParams::default()
            },
            AugmentParams {
                extreme_frac: f64::NAN,
                ..AugmentParams::default()
            },
            AugmentParams {
                n_samples: 0,
                ..AugmentParams::default()
            },
            AugmentParams {
                n_samples: MAX_AUGMENTED_ROWS + 1,
                ..AugmentParams::default()
            },
        ];
        for params in bad {
            assert!(matches!(
                augment(&x, &y, None, &params),
                Err(IkuError::InvalidParameter(_))
            ));
        }

        assert!(augment(&[], &[], None, &AugmentParams::default()).is_err());
        assert!(augment(&x, &y[..2], None, &AugmentParams::default()).is_err());
    }
}
