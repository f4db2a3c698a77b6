//! Model collaborator interface and a small reference network.
//!
//! The query pipeline only needs three things from a model: an ordered list of
//! its layers, a way to flip individual dropout layers between stochastic and
//! deterministic behaviour, and a forward pass over one batch.

mod sequential;

pub use sequential::{Layer, Sequential};

use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewMut1};

use crate::data::Batch;
use crate::error::InferenceError;

/// Opaque options forwarded verbatim to [`DropoutModel::infer`].
pub type Passthrough = BTreeMap<String, serde_json::Value>;

/// A model whose dropout layers can be toggled independently.
pub trait DropoutModel {
    /// Type names of every layer, in a stable traversal order.
    ///
    /// Positions in this list are the indices accepted by
    /// [`DropoutModel::set_layer_stochastic`].
    fn layer_type_names(&self) -> Vec<String>;

    /// Switch one layer between stochastic (`true`) and inference (`false`) mode.
    ///
    /// Must not touch any other layer.
    fn set_layer_stochastic(&mut self, index: usize, stochastic: bool);

    /// Run a forward pass over one batch without gradient bookkeeping.
    fn infer(
        &mut self,
        batch: &Batch<'_>,
        passthrough: &Passthrough,
    ) -> Result<ArrayD<f32>, InferenceError>;
}

/// Whether a layer type name identifies a dropout layer.
pub fn is_dropout_type(type_name: &str) -> bool {
    type_name.starts_with("Dropout")
}

/// Numerically stable softmax over one lane.
///
/// NaN entries mark padded classes: they stay NaN and take no probability mass.
pub(crate) fn softmax_in_place(mut lane: ArrayViewMut1<'_, f32>) {
    let valid = lane.iter().filter(|v| !v.is_nan()).count();
    if valid == 0 {
        return;
    }
    let max = lane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in lane.iter_mut().filter(|v| !v.is_nan()) {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / valid as f32;
        lane.mapv_inplace(|v| if v.is_nan() { v } else { uniform });
        return;
    }
    lane.mapv_inplace(|v| v / sum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn dropout_type_names_match_by_prefix() {
        assert!(is_dropout_type("Dropout"));
        assert!(is_dropout_type("Dropout2d"));
        assert!(!is_dropout_type("Linear"));
        assert!(!is_dropout_type("AlphaDropout"));
    }

    #[test]
    fn softmax_output_sums_to_one() {
        let mut lane = array![1.0f32, 2.0, 3.0];
        softmax_in_place(lane.view_mut());
        let sum: f32 = lane.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(lane[2] > lane[1] && lane[1] > lane[0]);
    }

    #[test]
    fn softmax_leaves_padded_classes_masked() {
        let mut lane = array![0.0f32, f32::NAN, 0.0];
        softmax_in_place(lane.view_mut());
        assert!(lane[1].is_nan());
        assert!((lane[0] - 0.5).abs() < 1e-6);
        assert!((lane[2] - 0.5).abs() < 1e-6);
    }
}
