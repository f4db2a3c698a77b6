//! Pool-based active learning loop.
//!
//! An [`ActiveLearner`] owns an estimator, a query strategy and the labeled rows
//! taught so far. `query` asks the strategy which pool rows to label next;
//! `teach` appends labeled rows and refits.

mod evaluation;

pub use evaluation::{ConfusionMatrix, argmax_rows};

use ndarray::Array2;

use crate::data::{PoolData, vstack};
use crate::error::{ConfigurationError, QueryResult};
use crate::selection::Selection;
use crate::strategy::MetricScores;

/// A trainable probabilistic classifier.
pub trait Estimator {
    /// Fit on `x` with one class label per row.
    fn fit(&mut self, x: &PoolData, y: &[usize]) -> QueryResult<()>;

    /// Class probabilities with shape `[rows, classes]`.
    fn predict_proba(&mut self, x: &PoolData) -> QueryResult<Array2<f32>>;

    /// Most probable class per row.
    fn predict(&mut self, x: &PoolData) -> QueryResult<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_rows(proba.view()))
    }

    /// Mean accuracy on `x` against `y`.
    fn score(&mut self, x: &PoolData, y: &[usize]) -> QueryResult<f64> {
        let proba = self.predict_proba(x)?;
        check_labels(proba.nrows(), y.len())?;
        let predicted = argmax_rows(proba.view());
        Ok(ConfusionMatrix::from_labels(proba.ncols(), y, &predicted).accuracy())
    }
}

/// Scores returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryScores {
    /// Scores of the selected rows, aligned with the indices.
    Selected(Vec<f64>),
    /// Full score vectors keyed by metric.
    Metrics(MetricScores),
}

/// Result of one strategy call. Score-only strategies leave `indices` empty.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub indices: Option<Vec<usize>>,
    pub scores: QueryScores,
}

impl From<Selection> for QueryOutcome {
    fn from(selection: Selection) -> Self {
        Self {
            indices: Some(selection.indices),
            scores: QueryScores::Selected(selection.scores),
        }
    }
}

impl From<MetricScores> for QueryOutcome {
    fn from(scores: MetricScores) -> Self {
        Self {
            indices: None,
            scores: QueryScores::Metrics(scores),
        }
    }
}

/// Turns an estimator and a pool into a query outcome.
pub trait QueryStrategy<E: ?Sized> {
    fn query(&self, estimator: &mut E, pool: &PoolData) -> QueryResult<QueryOutcome>;
}

impl<E: ?Sized, F> QueryStrategy<E> for F
where
    F: Fn(&mut E, &PoolData) -> QueryResult<QueryOutcome>,
{
    fn query(&self, estimator: &mut E, pool: &PoolData) -> QueryResult<QueryOutcome> {
        self(estimator, pool)
    }
}

/// What [`ActiveLearner::query`] hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub indices: Option<Vec<usize>>,
    /// The pool rows at `indices`, in the same order.
    pub instances: Option<PoolData>,
    pub scores: QueryScores,
}

pub struct ActiveLearner<E, S> {
    estimator: E,
    strategy: S,
    x_training: Option<PoolData>,
    y_training: Vec<usize>,
}

impl<E, S> ActiveLearner<E, S>
where
    E: Estimator,
    S: QueryStrategy<E>,
{
    /// Learner with no labeled data; the estimator is used as given.
    pub fn new(estimator: E, strategy: S) -> Self {
        Self {
            estimator,
            strategy,
            x_training: None,
            y_training: Vec::new(),
        }
    }

    /// Learner seeded with labeled rows; the estimator is fitted on them.
    pub fn with_training(estimator: E, strategy: S, x: PoolData, y: Vec<usize>) -> QueryResult<Self> {
        let mut learner = Self::new(estimator, strategy);
        learner.teach(x, y, false)?;
        Ok(learner)
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    pub fn training_data(&self) -> Option<(&PoolData, &[usize])> {
        self.x_training
            .as_ref()
            .map(|x| (x, self.y_training.as_slice()))
    }

    /// Ask the strategy which pool rows to label next.
    pub fn query(&mut self, pool: &PoolData) -> QueryResult<QueryReport> {
        let outcome = self.strategy.query(&mut self.estimator, pool)?;
        let instances = match &outcome.indices {
            Some(indices) => Some(pool.retrieve_rows(indices)?),
            None => None,
        };
        tracing::debug!(
            selected = outcome.indices.as_ref().map(Vec::len),
            "Active learner query done"
        );
        Ok(QueryReport {
            indices: outcome.indices,
            instances,
            scores: outcome.scores,
        })
    }

    /// Add labeled rows and refit, either on everything taught so far or only on
    /// the new rows.
    pub fn teach(&mut self, x: PoolData, y: Vec<usize>, only_new: bool) -> QueryResult<()> {
        check_labels(x.n_rows()?, y.len())?;
        let combined_x = match &self.x_training {
            None => x.clone(),
            Some(previous) => vstack(&[previous.clone(), x.clone()])?,
        };
        let mut combined_y = self.y_training.clone();
        combined_y.extend_from_slice(&y);

        // Training data only changes once the estimator accepted it.
        if only_new {
            self.estimator.fit(&x, &y)?;
        } else {
            self.estimator.fit(&combined_x, &combined_y)?;
        }
        self.x_training = Some(combined_x);
        self.y_training = combined_y;
        tracing::debug!(
            taught = y.len(),
            total = self.y_training.len(),
            only_new,
            "Estimator refitted"
        );
        Ok(())
    }

    pub fn predict_proba(&mut self, x: &PoolData) -> QueryResult<Array2<f32>> {
        self.estimator.predict_proba(x)
    }

    pub fn predict(&mut self, x: &PoolData) -> QueryResult<Vec<usize>> {
        self.estimator.predict(x)
    }

    pub fn score(&mut self, x: &PoolData, y: &[usize]) -> QueryResult<f64> {
        self.estimator.score(x, y)
    }
}

fn check_labels(rows: usize, labels: usize) -> Result<(), ConfigurationError> {
    if rows != labels {
        return Err(ConfigurationError::Invalid(format!(
            "{rows} rows but {labels} labels"
        )));
    }
    Ok(())
}
