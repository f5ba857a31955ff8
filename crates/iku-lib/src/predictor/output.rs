//! Prediction post-processing
//!
//! Maps raw predictions onto the fixed IKU category bands and flags the
//! input fields that fall outside the training range.

use crate::models::{Category, TrainingBounds, FEATURE_COLUMNS, FEATURE_LABELS, NUM_FEATURES};
use serde::{Deserialize, Serialize};

/// Lower bound (inclusive) of the "Sangat Baik" band
pub const SANGAT_BAIK_MIN: f64 = 90.0;

/// Lower bound (inclusive) of the "Baik" band
pub const BAIK_MIN: f64 = 70.0;

/// Lower bound (inclusive) of the "Sedang" band
pub const SEDANG_MIN: f64 = 50.0;

/// Lower bound (inclusive) of the "Kurang" band
pub const KURANG_MIN: f64 = 25.0;

/// Map a prediction onto its IKU category.
///
/// The lower bound of each band is inclusive. NaN falls through to
/// `SangatKurang`; the predictor never emits NaN for validated input.
pub fn categorize(prediction: f64) -> Category {
    if prediction >= SANGAT_BAIK_MIN {
        Category::SangatBaik
    } else if prediction >= BAIK_MIN {
        Category::Baik
    } else if prediction >= SEDANG_MIN {
        Category::Sedang
    } else if prediction >= KURANG_MIN {
        Category::Kurang
    } else {
        Category::SangatKurang
    }
}

/// An input field lying outside the training range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfRangeField {
    pub column: String,
    pub label: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// List every field of `row` outside `[min, max]`
pub fn out_of_range_fields(
    row: &[f64; NUM_FEATURES],
    bounds: &TrainingBounds,
) -> Vec<OutOfRangeField> {
    (0..NUM_FEATURES)
        .filter(|&i| row[i] < bounds.min[i] || row[i] > bounds.max[i])
        .map(|i| OutOfRangeField {
            column: FEATURE_COLUMNS[i].to_string(),
            label: FEATURE_LABELS[i].to_string(),
            value: row[i],
            min: bounds.min[i],
            max: bounds.max[i],
        })
        .collect()
}
