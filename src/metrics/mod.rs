//! Uncertainty metrics over a list of stochastic prediction cycles.
//!
//! Each aggregator stacks the cycles along a new trailing axis and reduces over
//! it, giving one score per instance. Predictions are `[instances, classes]`
//! or `[instances, classes, extra...]`; the extra axes are flattened into one.
//! NaN entries are treated as padded class slots and skipped by every reduction.
//!
//! Formulas follow Gal, Islam and Ghahramani, "Deep Bayesian Active Learning with
//! Image Data" (2017).

mod nan;

pub use nan::entr;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array4, ArrayD, ArrayViewD, Axis, s};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, QueryError, QueryResult};
use nan::{NanAccumulator, lane_std, nan_max};

/// Uncertainty metric computed from MC dropout cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Mutual information between predictions and model parameters.
    #[serde(rename = "bald")]
    Bald,
    /// Mean over classes of the per-class standard deviation across cycles.
    #[serde(rename = "mean_st")]
    MeanStd,
    /// Mean per-cycle predictive entropy.
    #[serde(rename = "max_entropy")]
    MaxEntropy,
    /// One minus the top class probability of the cycle-averaged prediction.
    #[serde(rename = "max_var")]
    MaxVariationRatios,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Bald,
        Metric::MeanStd,
        Metric::MaxEntropy,
        Metric::MaxVariationRatios,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Bald => "bald",
            Metric::MeanStd => "mean_st",
            Metric::MaxEntropy => "max_entropy",
            Metric::MaxVariationRatios => "max_var",
        }
    }

    /// Score every instance in `cycles` with this metric.
    pub fn compute(self, cycles: &[ArrayD<f32>]) -> QueryResult<Array1<f64>> {
        match self {
            Metric::Bald => bald_divergence(cycles),
            Metric::MeanStd => mean_standard_deviation(cycles),
            Metric::MaxEntropy => entropy(cycles),
            Metric::MaxVariationRatios => variation_ratios(cycles),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownMetric(s.to_string()))
    }
}

/// Stack cycles into `[instances, classes, extra, cycles]`.
fn stack_cycles(cycles: &[ArrayD<f32>]) -> QueryResult<Array4<f64>> {
    let Some(first) = cycles.first() else {
        return Err(ConfigurationError::ZeroCycles.into());
    };
    if first.ndim() < 2 {
        return Err(QueryError::UnsupportedType {
            operation: "metric aggregation",
            found: "1-d predictions",
        });
    }
    let shape = first.shape();
    let (n, c) = (shape[0], shape[1]);
    let extra: usize = shape[2..].iter().product();

    let views: Vec<ArrayViewD<'_, f32>> = cycles.iter().map(|cycle| cycle.view()).collect();
    let stacked = ndarray::stack(Axis(first.ndim()), &views)?;
    let stacked = stacked.mapv(f64::from);
    let reshaped = stacked.to_shape((n, c, extra, cycles.len()))?;
    Ok(reshaped.into_owned())
}

/// Per-class standard deviation across cycles, averaged over classes.
pub fn mean_standard_deviation(cycles: &[ArrayD<f32>]) -> QueryResult<Array1<f64>> {
    let stacked = stack_cycles(cycles)?;
    let (n, c, e, _) = stacked.dim();
    Ok(Array1::from_shape_fn(n, |i| {
        let mut acc = NanAccumulator::default();
        for class in 0..c {
            for extra in 0..e {
                acc.push(lane_std(stacked.slice(s![i, class, extra, ..])));
            }
        }
        acc.mean()
    }))
}

/// Per-cycle entropy summed over classes, averaged over cycles.
pub fn entropy(cycles: &[ArrayD<f32>]) -> QueryResult<Array1<f64>> {
    let stacked = stack_cycles(cycles)?;
    let (n, c, e, t) = stacked.dim();
    Ok(Array1::from_shape_fn(n, |i| {
        let mut acc = NanAccumulator::default();
        for extra in 0..e {
            for cycle in 0..t {
                let per_cycle: NanAccumulator = (0..c)
                    .map(|class| entr(stacked[[i, class, extra, cycle]]))
                    .collect();
                acc.push(per_cycle.sum_or_nan());
            }
        }
        acc.mean()
    }))
}

/// `1 - max_class(mean over cycles)`.
///
/// An instance whose classes are all NaN scores 1.
pub fn variation_ratios(cycles: &[ArrayD<f32>]) -> QueryResult<Array1<f64>> {
    let stacked = stack_cycles(cycles)?;
    let (n, c, e, _) = stacked.dim();
    Ok(Array1::from_shape_fn(n, |i| {
        let means = (0..c).flat_map(|class| (0..e).map(move |extra| (class, extra)));
        let top = nan_max(
            means.map(|(class, extra)| {
                stacked
                    .slice(s![i, class, extra, ..])
                    .iter()
                    .copied()
                    .collect::<NanAccumulator>()
                    .mean()
            }),
            0.0,
        );
        1.0 - top
    }))
}

/// Entropy of the mean prediction minus the mean entropy of the predictions,
/// summed over classes and extra axes.
///
/// Non-negative for probability inputs by Jensen's inequality. An instance whose
/// classes are all NaN scores 0.
pub fn bald_divergence(cycles: &[ArrayD<f32>]) -> QueryResult<Array1<f64>> {
    let stacked = stack_cycles(cycles)?;
    let (n, c, e, _) = stacked.dim();
    Ok(Array1::from_shape_fn(n, |i| {
        let mut total = NanAccumulator::default();
        for class in 0..c {
            for extra in 0..e {
                let lane = stacked.slice(s![i, class, extra, ..]);
                let mut probs = NanAccumulator::default();
                let mut entropies = NanAccumulator::default();
                for &p in lane.iter().filter(|p| !p.is_nan()) {
                    probs.push(p);
                    entropies.push(entr(p));
                }
                if probs.count == 0 {
                    continue;
                }
                // Both means divide by the same count so Jensen's inequality holds.
                let expected_entropy = entropies.sum / probs.count as f64;
                let entropy_of_mean = entr(probs.mean());
                total.push(entropy_of_mean - expected_entropy);
            }
        }
        total.sum
    }))
}
