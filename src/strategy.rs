//! MC dropout query strategies.
//!
//! Each strategy samples the pool once (or `sampling_passes` times), scores every
//! instance with one or more [`Metric`]s and, for single-metric strategies, picks
//! the top `n_instances`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::PoolData;
use crate::error::{ConfigurationError, QueryResult};
use crate::learner::{QueryOutcome, QueryStrategy};
use crate::metrics::Metric;
use crate::model::DropoutModel;
use crate::sampler::{
    IdentityAdaptor, LogitsAdaptor, SamplingObserver, SamplingOptions, TracingObserver,
    get_predictions,
};
use crate::selection::{Selection, multi_argmax, shuffled_argmax};

/// Full score vector per metric, without selection.
pub type MetricScores = BTreeMap<Metric, Array1<f64>>;

/// Options shared by every MC dropout strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Number of instances to select.
    #[serde(default = "default_n_instances")]
    pub n_instances: usize,
    /// Shuffle before ranking so that equal scores are picked at random.
    #[serde(default)]
    pub random_tie_break: bool,
    /// Seed for the tie-break shuffle; `None` draws from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Independent sampling passes whose scores are averaged.
    #[serde(default = "default_sampling_passes")]
    pub sampling_passes: usize,
    #[serde(flatten)]
    pub sampling: SamplingOptions,
}

fn default_n_instances() -> usize {
    1
}

fn default_sampling_passes() -> usize {
    1
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            n_instances: default_n_instances(),
            random_tie_break: false,
            seed: None,
            sampling_passes: default_sampling_passes(),
            sampling: SamplingOptions::default(),
        }
    }
}

impl QueryOptions {
    /// Options selecting `n_instances` with everything else at its default.
    pub fn with_instances(n_instances: usize) -> Self {
        Self {
            n_instances,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.n_instances == 0 {
            return Err(ConfigurationError::ZeroInstances);
        }
        if self.sampling_passes == 0 {
            return Err(ConfigurationError::ZeroPasses);
        }
        self.sampling.validate()
    }

    /// Parse options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let options: Self =
            toml::from_str(text).map_err(|err| ConfigurationError::Invalid(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }
}

/// MC dropout query runner with an attached logits adaptor and observer.
pub struct McDropout<'a> {
    options: QueryOptions,
    adaptor: Box<dyn LogitsAdaptor + 'a>,
    observer: Box<dyn SamplingObserver + 'a>,
}

impl<'a> McDropout<'a> {
    pub fn new(options: QueryOptions) -> Self {
        Self {
            options,
            adaptor: Box::new(IdentityAdaptor),
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_adaptor(mut self, adaptor: impl LogitsAdaptor + 'a) -> Self {
        self.adaptor = Box::new(adaptor);
        self
    }

    pub fn with_observer(mut self, observer: impl SamplingObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Top instances by BALD score.
    pub fn bald<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
    ) -> QueryResult<Selection> {
        self.select(model, pool, Metric::Bald)
    }

    /// Top instances by mean per-class standard deviation.
    pub fn mean_std<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
    ) -> QueryResult<Selection> {
        self.select(model, pool, Metric::MeanStd)
    }

    /// Top instances by mean predictive entropy.
    pub fn max_entropy<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
    ) -> QueryResult<Selection> {
        self.select(model, pool, Metric::MaxEntropy)
    }

    /// Top instances by variation ratio.
    pub fn max_variation_ratios<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
    ) -> QueryResult<Selection> {
        self.select(model, pool, Metric::MaxVariationRatios)
    }

    /// Score the pool with several metrics from one shared set of cycles.
    ///
    /// No selection is made; ranking is left to the caller. Repeated metrics are
    /// scored once and an empty list means [`Metric::ALL`].
    pub fn multi<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
        metrics: &[Metric],
    ) -> QueryResult<MetricScores> {
        let requested: BTreeSet<Metric> = if metrics.is_empty() {
            Metric::ALL.into_iter().collect()
        } else {
            metrics.iter().copied().collect()
        };
        let _span = tracing::info_span!("mc_dropout_multi", metrics = requested.len()).entered();
        self.options.validate()?;
        let n_rows = pool.n_rows()?;
        let started = Instant::now();
        let scores = self.scores(model, pool, &requested)?;
        tracing::info!(
            metrics = ?requested,
            n_rows,
            elapsed = ?started.elapsed(),
            "MC dropout metrics computed"
        );
        Ok(scores)
    }

    /// Score the pool with `metric` and pick the top `n_instances`.
    pub fn select<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
        metric: Metric,
    ) -> QueryResult<Selection> {
        let _span = tracing::info_span!("mc_dropout_query", %metric).entered();
        self.options.validate()?;
        let available = pool.n_rows()?;
        if self.options.n_instances > available {
            return Err(ConfigurationError::TooManyInstances {
                requested: self.options.n_instances,
                available,
            }
            .into());
        }
        let started = Instant::now();
        let mut scores = self.scores(model, pool, &BTreeSet::from([metric]))?;
        let Some(values) = scores.remove(&metric) else {
            return Err(ConfigurationError::UnknownMetric(metric.to_string()).into());
        };

        let selection = if self.options.random_tie_break {
            let mut rng = match self.options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            shuffled_argmax(values.view(), self.options.n_instances, &mut rng)?
        } else {
            multi_argmax(values.view(), self.options.n_instances)?
        };
        tracing::info!(
            %metric,
            selected = selection.len(),
            pool = available,
            elapsed = ?started.elapsed(),
            "MC dropout query finished"
        );
        Ok(selection)
    }

    fn scores<M: DropoutModel + ?Sized>(
        &self,
        model: &mut M,
        pool: &PoolData,
        metrics: &BTreeSet<Metric>,
    ) -> QueryResult<MetricScores> {
        let passes = self.options.sampling_passes;
        let mut totals = MetricScores::new();
        for _ in 0..passes {
            let cycles = get_predictions(
                model,
                pool,
                &self.options.sampling,
                self.adaptor.as_ref(),
                self.observer.as_ref(),
            )?;
            for &metric in metrics {
                let started = Instant::now();
                let values = metric.compute(&cycles)?;
                self.observer.on_metric(metric.as_str(), started.elapsed());
                match totals.get_mut(&metric) {
                    Some(total) => *total += &values,
                    None => {
                        totals.insert(metric, values);
                    }
                }
            }
        }
        if passes > 1 {
            let scale = 1.0 / passes as f64;
            for values in totals.values_mut() {
                values.mapv_inplace(|v| v * scale);
            }
        }
        Ok(totals)
    }
}

/// Which scores an [`McDropoutStrategy`] hands back to a learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// Select the top instances by one metric.
    Select(Metric),
    /// Return full score vectors for several metrics.
    Scores(Vec<Metric>),
}

/// Adapts [`McDropout`] to the learner's [`QueryStrategy`] interface.
pub struct McDropoutStrategy<'a> {
    pub query: McDropout<'a>,
    pub target: QueryTarget,
}

impl<'a> McDropoutStrategy<'a> {
    pub fn new(query: McDropout<'a>, target: QueryTarget) -> Self {
        Self { query, target }
    }
}

impl<M: DropoutModel> QueryStrategy<M> for McDropoutStrategy<'_> {
    fn query(&self, model: &mut M, pool: &PoolData) -> QueryResult<QueryOutcome> {
        match &self.target {
            QueryTarget::Select(metric) => {
                self.query.select(model, pool, *metric).map(QueryOutcome::from)
            }
            QueryTarget::Scores(metrics) => {
                self.query.multi(model, pool, metrics).map(QueryOutcome::from)
            }
        }
    }
}

/// BALD query with the identity adaptor.
pub fn mc_dropout_bald<M: DropoutModel + ?Sized>(
    model: &mut M,
    pool: &PoolData,
    options: &QueryOptions,
) -> QueryResult<Selection> {
    McDropout::new(options.clone()).bald(model, pool)
}

/// Mean standard deviation query with the identity adaptor.
pub fn mc_dropout_mean_std<M: DropoutModel + ?Sized>(
    model: &mut M,
    pool: &PoolData,
    options: &QueryOptions,
) -> QueryResult<Selection> {
    McDropout::new(options.clone()).mean_std(model, pool)
}

/// Maximum entropy query with the identity adaptor.
pub fn mc_dropout_max_entropy<M: DropoutModel + ?Sized>(
    model: &mut M,
    pool: &PoolData,
    options: &QueryOptions,
) -> QueryResult<Selection> {
    McDropout::new(options.clone()).max_entropy(model, pool)
}

/// Maximum variation ratio query with the identity adaptor.
pub fn mc_dropout_max_variation_ratios<M: DropoutModel + ?Sized>(
    model: &mut M,
    pool: &PoolData,
    options: &QueryOptions,
) -> QueryResult<Selection> {
    McDropout::new(options.clone()).max_variation_ratios(model, pool)
}

/// Every requested metric from one sampling run; an empty list means all metrics.
pub fn mc_dropout_multi<M: DropoutModel + ?Sized>(
    model: &mut M,
    pool: &PoolData,
    metrics: &[Metric],
    options: &QueryOptions,
) -> QueryResult<MetricScores> {
    McDropout::new(options.clone()).multi(model, pool, metrics)
}
