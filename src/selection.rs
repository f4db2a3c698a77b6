//! Top-k selection over per-instance scores.
//!
//! Higher scores win. NaN scores rank below every real score.

use std::cmp::Reverse;

use ndarray::ArrayView1;
use ordered_float::OrderedFloat;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, QueryResult};

/// Chosen instance indices with their scores, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub indices: Vec<usize>,
    pub scores: Vec<f64>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Pick the `n_instances` highest scores; ties go to the lower index.
pub fn multi_argmax(values: ArrayView1<'_, f64>, n_instances: usize) -> QueryResult<Selection> {
    check_count(values.len(), n_instances)?;
    let order: Vec<usize> = (0..values.len()).collect();
    Ok(take_best(values, order, n_instances))
}

/// Pick the `n_instances` highest scores, breaking ties uniformly at random.
pub fn shuffled_argmax<R: Rng + ?Sized>(
    values: ArrayView1<'_, f64>,
    n_instances: usize,
    rng: &mut R,
) -> QueryResult<Selection> {
    check_count(values.len(), n_instances)?;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.shuffle(rng);
    Ok(take_best(values, order, n_instances))
}

fn check_count(available: usize, requested: usize) -> Result<(), ConfigurationError> {
    if requested == 0 {
        return Err(ConfigurationError::ZeroInstances);
    }
    if requested > available {
        return Err(ConfigurationError::TooManyInstances {
            requested,
            available,
        });
    }
    Ok(())
}

/// Stable sort of `order` by descending score, so equal scores keep their
/// relative position in `order`.
fn take_best(values: ArrayView1<'_, f64>, mut order: Vec<usize>, n_instances: usize) -> Selection {
    order.sort_by_key(|&idx| {
        let score = values[idx];
        (score.is_nan(), Reverse(OrderedFloat(score)))
    });
    order.truncate(n_instances);
    let scores = order.iter().map(|&idx| values[idx]).collect();
    Selection {
        indices: order,
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use ndarray::{Array1, array};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    #[test]
    fn picks_highest_scores_in_descending_order() {
        let values = array![0.1, 0.9, 0.5, 0.7];
        let selection = multi_argmax(values.view(), 3).unwrap();
        assert_eq!(selection.indices, vec![1, 3, 2]);
        assert_eq!(selection.scores, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn ties_prefer_lower_indices_by_default() {
        let values = Array1::from_elem(6, 1.0);
        let selection = multi_argmax(values.view(), 3).unwrap();
        assert_eq!(selection.indices, vec![0, 1, 2]);
    }

    #[test]
    fn nan_scores_rank_last() {
        let values = array![f64::NAN, 0.2, f64::NAN, 0.1];
        let selection = multi_argmax(values.view(), 3).unwrap();
        assert_eq!(selection.indices[..2], [1, 3]);
        assert!(selection.scores[2].is_nan());
    }

    #[test]
    fn shuffled_tie_break_varies_across_seeds() {
        let values = Array1::from_elem(20, 0.5);
        let mut seen = BTreeSet::new();
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selection = shuffled_argmax(values.view(), 5, &mut rng).unwrap();
            let distinct: BTreeSet<usize> = selection.indices.iter().copied().collect();
            assert_eq!(distinct.len(), 5);
            assert!(selection.indices.iter().all(|&idx| idx < 20));
            seen.insert(selection.indices);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn shuffled_tie_break_still_respects_scores() {
        let values = array![0.0, 3.0, 1.0, 3.0, 2.0];
        let mut rng = StdRng::seed_from_u64(42);
        let selection = shuffled_argmax(values.view(), 3, &mut rng).unwrap();
        let top_two: BTreeSet<usize> = selection.indices[..2].iter().copied().collect();
        assert_eq!(top_two, BTreeSet::from([1, 3]));
        assert_eq!(selection.indices[2], 4);
        assert_eq!(selection.scores, vec![3.0, 3.0, 2.0]);
    }

    #[test]
    fn requesting_more_than_available_fails() {
        let values = array![1.0, 2.0];
        let err = multi_argmax(values.view(), 3).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Configuration(ConfigurationError::TooManyInstances {
                requested: 3,
                available: 2
            })
        ));
        assert!(multi_argmax(values.view(), 0).is_err());
    }
}
