//! Error types shared by the query pipeline.
//!
//! Every fallible entry point returns [`QueryError`]. User mistakes surface as
//! [`ConfigurationError`], model failures as [`InferenceError`] wrapped with the
//! cycle and batch that produced them.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type QueryResult<T> = Result<T, QueryError>;

/// Top-level error returned by samplers, aggregators and query strategies.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The caller supplied options or inputs that cannot be honoured.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The operation does not support the given container variant.
    #[error("{operation} does not support {found} input")]
    UnsupportedType {
        operation: &'static str,
        found: &'static str,
    },
    /// The model forward pass failed during sampling.
    #[error("Inference failed in cycle {cycle}, batch {batch}: {source}")]
    Inference {
        cycle: usize,
        batch: usize,
        #[source]
        source: InferenceError,
    },
    /// Cycle or chunk arrays could not be stacked or concatenated.
    #[error("Prediction shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// The learner's estimator failed to fit or predict.
    #[error("Estimator failed: {0}")]
    Estimator(String),
}

/// Invalid caller configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// An explicitly selected layer is not a dropout layer.
    #[error("Layer {index} is not a dropout layer (found {type_name})")]
    NotDropoutLayer { index: usize, type_name: String },
    /// An explicitly selected layer index does not exist.
    #[error("Layer index {index} is out of range for a model with {layer_count} layers")]
    LayerIndexOutOfRange { index: usize, layer_count: usize },
    /// More instances were requested than the pool holds.
    #[error("Requested {requested} instances but the pool only holds {available}")]
    TooManyInstances { requested: usize, available: usize },
    /// Zero instances were requested from a query.
    #[error("n_instances must be at least 1")]
    ZeroInstances,
    /// Sampling was asked to run zero dropout cycles.
    #[error("num_cycles must be at least 1")]
    ZeroCycles,
    /// The forward pass chunk size is zero.
    #[error("sample_per_forward_pass must be at least 1")]
    ZeroBatchSize,
    /// A query was asked to run zero sampling passes.
    #[error("sampling_passes must be at least 1")]
    ZeroPasses,
    /// The pool has no rows to sample from.
    #[error("The sample pool is empty")]
    EmptyPool,
    /// A keyed input holds values with differing row counts.
    #[error("Input `{key}` has {found} rows but {expected} were expected")]
    MismatchedRowCounts {
        key: String,
        expected: usize,
        found: usize,
    },
    /// A metric name did not match any known metric.
    #[error("Unknown metric `{0}`")]
    UnknownMetric(String),
    /// Any other malformed option value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure raised by a model collaborator during a forward pass.
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    /// The batch does not have the feature width the model expects.
    #[error("Expected {expected} input features, got {found}")]
    InputShape { expected: usize, found: usize },
    /// A keyed batch does not contain the named input.
    #[error("Missing model input `{0}`")]
    MissingInput(String),
    /// The batch layout is not one the model understands.
    #[error("Unexpected model input: {0}")]
    UnexpectedInput(String),
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_name_the_offending_values() {
        let err = QueryError::from(ConfigurationError::NotDropoutLayer {
            index: 3,
            type_name: "Linear".into(),
        });
        assert_eq!(
            err.to_string(),
            "Layer 3 is not a dropout layer (found Linear)"
        );

        let err = ConfigurationError::TooManyInstances {
            requested: 12,
            available: 10,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn zero_count_errors_name_the_option() {
        let cases = [
            (ConfigurationError::ZeroInstances, "n_instances"),
            (ConfigurationError::ZeroCycles, "num_cycles"),
            (ConfigurationError::ZeroBatchSize, "sample_per_forward_pass"),
            (ConfigurationError::ZeroPasses, "sampling_passes"),
        ];
        for (err, option) in cases {
            assert_eq!(err.to_string(), format!("{option} must be at least 1"));
        }
    }

    #[test]
    fn inference_error_keeps_cycle_context() {
        let err = QueryError::Inference {
            cycle: 4,
            batch: 1,
            source: InferenceError::Other("device lost".into()),
        };
        let text = err.to_string();
        assert!(text.contains("cycle 4"));
        assert!(text.contains("batch 1"));
        assert!(text.contains("device lost"));
    }
}
