//! Library exports for reuse in benchmarks and tests.
/// Pool containers and row utilities.
pub mod data;
/// Dropout layer mode switching.
pub mod dropout;
/// Error types.
pub mod error;
/// Active learning loop and estimator interface.
pub mod learner;
/// Run log setup for query sessions.
pub mod logging;
/// Uncertainty aggregators over MC dropout cycles.
pub mod metrics;
/// Model collaborator interface and a reference network.
pub mod model;
/// Repeated stochastic prediction over a pool.
pub mod sampler;
/// Top-k selection over scores.
pub mod selection;
/// MC dropout query strategies.
pub mod strategy;

pub use data::PoolData;
pub use error::{ConfigurationError, InferenceError, QueryError, QueryResult};
pub use learner::{ActiveLearner, Estimator, QueryOutcome, QueryScores, QueryStrategy};
pub use metrics::Metric;
pub use model::{DropoutModel, Passthrough, Sequential};
pub use sampler::{SamplingOptions, get_predictions};
pub use selection::Selection;
pub use strategy::{
    McDropout, McDropoutStrategy, MetricScores, QueryOptions, QueryTarget, mc_dropout_bald,
    mc_dropout_max_entropy, mc_dropout_max_variation_ratios, mc_dropout_mean_std,
    mc_dropout_multi,
};
