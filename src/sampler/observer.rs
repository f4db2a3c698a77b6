use std::time::Duration;

/// Timing hooks fired while a query runs.
///
/// All methods default to no-ops, so implementors only override what they need.
pub trait SamplingObserver {
    /// The pool was split into `n_batches` chunks.
    fn on_split(&self, _n_rows: usize, _n_batches: usize, _elapsed: Duration) {}
    /// One batch finished its forward pass and adaptation.
    fn on_batch(&self, _cycle: usize, _batch: usize, _rows: usize, _elapsed: Duration) {}
    /// One full pass over the pool finished.
    fn on_cycle(&self, _cycle: usize, _elapsed: Duration) {}
    /// All cycles finished and dropout is back in inference mode.
    fn on_sampling_done(&self, _cycles: usize, _elapsed: Duration) {}
    /// A metric aggregator finished.
    fn on_metric(&self, _metric: &str, _elapsed: Duration) {}
}

/// Ignores every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SamplingObserver for NoopObserver {}

/// Emits each hook as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SamplingObserver for TracingObserver {
    fn on_split(&self, n_rows: usize, n_batches: usize, elapsed: Duration) {
        tracing::debug!(n_rows, n_batches, ?elapsed, "pool split into batches");
    }

    fn on_batch(&self, cycle: usize, batch: usize, rows: usize, elapsed: Duration) {
        tracing::debug!(cycle, batch, rows, ?elapsed, "batch inferred");
    }

    fn on_cycle(&self, cycle: usize, elapsed: Duration) {
        tracing::debug!(cycle, ?elapsed, "prediction cycle finished");
    }

    fn on_sampling_done(&self, cycles: usize, elapsed: Duration) {
        tracing::debug!(cycles, ?elapsed, "sampling finished");
    }

    fn on_metric(&self, metric: &str, elapsed: Duration) {
        tracing::debug!(metric, ?elapsed, "metric aggregated");
    }
}
