//! NaN-aware reductions. NaN marks a padded class slot and is skipped, never
//! propagated.

use ndarray::ArrayView1;

/// Elementwise entropy term `-x ln x` with `0 ln 0 = 0`.
///
/// Negative inputs give `-inf` and NaN stays NaN.
pub fn entr(x: f64) -> f64 {
    if x.is_nan() {
        f64::NAN
    } else if x > 0.0 {
        -x * x.ln()
    } else if x == 0.0 {
        0.0
    } else {
        f64::NEG_INFINITY
    }
}

/// Sum and count of the non-NaN values of an iterator.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NanAccumulator {
    pub sum: f64,
    pub count: usize,
}

impl NanAccumulator {
    pub fn push(&mut self, value: f64) {
        if !value.is_nan() {
            self.sum += value;
            self.count += 1;
        }
    }

    /// Mean of the pushed values, NaN when every value was NaN.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Sum of the pushed values, NaN when every value was NaN.
    pub fn sum_or_nan(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.sum }
    }
}

impl FromIterator<f64> for NanAccumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = NanAccumulator::default();
        for value in iter {
            acc.push(value);
        }
        acc
    }
}

/// Population standard deviation of a cycle lane.
///
/// A lane masked in any cycle has no defined spread and yields NaN, which the
/// class average then skips.
pub(crate) fn lane_std(lane: ArrayView1<'_, f64>) -> f64 {
    if lane.is_empty() || lane.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mean = lane.mean().unwrap_or(f64::NAN);
    lane.mapv(|v| (v - mean) * (v - mean))
        .mean()
        .map_or(f64::NAN, f64::sqrt)
}

/// Maximum of the non-NaN values, starting from `initial`.
pub(crate) fn nan_max<I: IntoIterator<Item = f64>>(values: I, initial: f64) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(initial, f64::max)
}
