use ndarray::{ArrayD, Axis};

use crate::data::Batch;
use crate::error::{QueryError, QueryResult};
use crate::model::softmax_in_place;

/// Converts raw model output for one batch into the `[rows, classes, ...]`
/// layout the metric aggregators expect.
pub trait LogitsAdaptor {
    fn adapt(&self, output: ArrayD<f32>, batch: &Batch<'_>) -> QueryResult<ArrayD<f32>>;
}

impl<F> LogitsAdaptor for F
where
    F: Fn(ArrayD<f32>, &Batch<'_>) -> QueryResult<ArrayD<f32>>,
{
    fn adapt(&self, output: ArrayD<f32>, batch: &Batch<'_>) -> QueryResult<ArrayD<f32>> {
        self(output, batch)
    }
}

/// Passes model output through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAdaptor;

impl LogitsAdaptor for IdentityAdaptor {
    fn adapt(&self, output: ArrayD<f32>, _batch: &Batch<'_>) -> QueryResult<ArrayD<f32>> {
        Ok(output)
    }
}

/// Turns raw logits into probabilities along the class axis (axis 1).
///
/// Trailing axes are kept, so `[rows, positions, heads]` span logits become one
/// distribution over positions per head.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxAdaptor;

impl LogitsAdaptor for SoftmaxAdaptor {
    fn adapt(&self, mut output: ArrayD<f32>, _batch: &Batch<'_>) -> QueryResult<ArrayD<f32>> {
        if output.ndim() < 2 {
            return Err(QueryError::UnsupportedType {
                operation: "softmax adaptor",
                found: "1-d output",
            });
        }
        for lane in output.lanes_mut(Axis(1)) {
            softmax_in_place(lane);
        }
        Ok(output)
    }
}
