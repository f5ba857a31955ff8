//! Distance of a feature row outside the training hyper-rectangle

use crate::error::{IkuError, Result};
use crate::models::{TrainingBounds, NUM_FEATURES};

/// Total excursion of `row` outside `bounds`, normalized by the summed
/// training range.
///
/// Returns `0.0` exactly when the row is inside the bounds on every field.
/// When every training range is zero-width the ratio is undefined: a row
/// inside the (point) bounds still yields `0.0`, any other row fails with
/// [`IkuError::DegenerateRange`].
pub fn extremity(row: &[f64; NUM_FEATURES], bounds: &TrainingBounds) -> Result<f64> {
    let excursion: f64 = (0..NUM_FEATURES)
        .map(|i| {
            let below = (bounds.min[i] - row[i]).max(0.0);
            let above = (row[i] - bounds.max[i]).max(0.0);
            below + above
        })
        .sum();

    if excursion == 0.0 {
        return Ok(0.0);
    }

    let total_range = bounds.total_range();
    if total_range <= 0.0 {
        return Err(IkuError::DegenerateRange);
    }

    Ok(excursion / total_range)
}
