//! Repeated stochastic forward passes over a sample pool.
//!
//! The pool is split into row chunks once, dropout is switched to stochastic mode,
//! and every cycle runs each chunk through the model in order. The chunk outputs
//! are concatenated back into one array per cycle.

mod adaptor;
mod observer;

pub use adaptor::{IdentityAdaptor, LogitsAdaptor, SoftmaxAdaptor};
pub use observer::{NoopObserver, SamplingObserver, TracingObserver};

use std::time::Instant;

use ndarray::{ArrayD, ArrayViewD, Axis, ErrorKind, ShapeError};
use serde::{Deserialize, Serialize};

use crate::data::PoolData;
use crate::dropout::StochasticDropout;
use crate::error::{ConfigurationError, QueryError, QueryResult};
use crate::model::{DropoutModel, Passthrough};

/// Default number of stochastic passes over the pool.
pub const DEFAULT_NUM_CYCLES: usize = 50;
/// Default maximum number of rows per forward pass.
pub const DEFAULT_SAMPLES_PER_FORWARD_PASS: usize = 1000;

/// One prediction array per cycle, in cycle order.
pub type CycleList = Vec<ArrayD<f32>>;

/// Knobs for [`get_predictions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Dropout layers to activate; empty means all of them.
    #[serde(default)]
    pub dropout_layer_indexes: Vec<usize>,
    #[serde(default = "default_num_cycles")]
    pub num_cycles: usize,
    /// Upper bound on rows per forward pass. Lower values bound peak memory.
    #[serde(default = "default_samples_per_forward_pass")]
    pub sample_per_forward_pass: usize,
    /// Forwarded verbatim to [`DropoutModel::infer`].
    #[serde(default)]
    pub passthrough: Passthrough,
}

fn default_num_cycles() -> usize {
    DEFAULT_NUM_CYCLES
}

fn default_samples_per_forward_pass() -> usize {
    DEFAULT_SAMPLES_PER_FORWARD_PASS
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            dropout_layer_indexes: Vec::new(),
            num_cycles: DEFAULT_NUM_CYCLES,
            sample_per_forward_pass: DEFAULT_SAMPLES_PER_FORWARD_PASS,
            passthrough: Passthrough::new(),
        }
    }
}

impl SamplingOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.num_cycles == 0 {
            return Err(ConfigurationError::ZeroCycles);
        }
        if self.sample_per_forward_pass == 0 {
            return Err(ConfigurationError::ZeroBatchSize);
        }
        Ok(())
    }
}

/// Run `num_cycles` stochastic passes of `model` over `pool`.
///
/// Dropout is enabled once before the first cycle and restored to inference mode
/// after the last one, or as soon as any cycle fails. A failed forward pass aborts
/// the whole call; no partial cycle list is returned.
pub fn get_predictions<M: DropoutModel + ?Sized>(
    model: &mut M,
    pool: &PoolData,
    options: &SamplingOptions,
    adaptor: &dyn LogitsAdaptor,
    observer: &dyn SamplingObserver,
) -> QueryResult<CycleList> {
    options.validate()?;
    let started = Instant::now();

    let n_rows = pool.n_rows()?;
    if n_rows == 0 {
        return Err(ConfigurationError::EmptyPool.into());
    }
    let batches = pool.batches(options.sample_per_forward_pass)?;
    observer.on_split(n_rows, batches.len(), started.elapsed());

    let mut guard = StochasticDropout::enable(model, &options.dropout_layer_indexes)?;
    let mut cycles = CycleList::with_capacity(options.num_cycles);
    for cycle in 0..options.num_cycles {
        let cycle_started = Instant::now();
        let mut outputs = Vec::with_capacity(batches.len());
        for (batch_idx, batch) in batches.iter().enumerate() {
            let batch_started = Instant::now();
            let raw = guard
                .model()
                .infer(batch, &options.passthrough)
                .map_err(|source| QueryError::Inference {
                    cycle,
                    batch: batch_idx,
                    source,
                })?;
            let adapted = adaptor.adapt(raw, batch)?;
            if adapted.ndim() == 0 || adapted.len_of(Axis(0)) != batch.n_rows() {
                return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
            }
            observer.on_batch(cycle, batch_idx, batch.n_rows(), batch_started.elapsed());
            outputs.push(adapted);
        }
        let views: Vec<ArrayViewD<'_, f32>> = outputs.iter().map(|out| out.view()).collect();
        cycles.push(ndarray::concatenate(Axis(0), &views)?);
        observer.on_cycle(cycle, cycle_started.elapsed());
    }
    drop(guard);

    observer.on_sampling_done(cycles.len(), started.elapsed());
    Ok(cycles)
}
