mod support;

use std::collections::BTreeSet;
use std::f64::consts::LN_2;

use ndarray::{Array2, array};
use quarry::sampler::{NoopObserver, SoftmaxAdaptor};
use quarry::{
    ConfigurationError, McDropout, Metric, PoolData, QueryError, QueryOptions, mc_dropout_bald,
    mc_dropout_max_entropy, mc_dropout_max_variation_ratios, mc_dropout_mean_std,
    mc_dropout_multi,
};
use support::scripted::ScriptedModel;

fn pool(rows: usize) -> PoolData {
    PoolData::from(Array2::from_shape_fn((rows, 2), |(r, c)| (r * 2 + c) as f32))
}

fn options(n_instances: usize, num_cycles: usize, batch: usize) -> QueryOptions {
    let mut options = QueryOptions::with_instances(n_instances);
    options.sampling.num_cycles = num_cycles;
    options.sampling.sample_per_forward_pass = batch;
    options
}

/// Instance 0 is confidently uncertain, 1 is stable, 2 flips between cycles.
fn disagreement_script() -> Vec<Array2<f32>> {
    vec![
        array![[0.5, 0.5], [1.0, 0.0], [1.0, 0.0]],
        array![[0.5, 0.5], [1.0, 0.0], [0.0, 1.0]],
    ]
}

#[test]
fn bald_prefers_instances_the_cycles_disagree_on() {
    let mut model = ScriptedModel::new(disagreement_script());
    let selection = mc_dropout_bald(&mut model, &pool(3), &options(1, 2, 2)).unwrap();
    assert_eq!(selection.indices, vec![2]);
    assert!((selection.scores[0] - LN_2).abs() < 1e-6);
}

#[test]
fn entropy_prefers_flat_predictions() {
    let mut model = ScriptedModel::new(disagreement_script());
    let selection = mc_dropout_max_entropy(&mut model, &pool(3), &options(1, 2, 3)).unwrap();
    assert_eq!(selection.indices, vec![0]);
    assert!((selection.scores[0] - LN_2).abs() < 1e-6);
}

#[test]
fn variation_ratio_ties_go_to_lower_index() {
    let mut model = ScriptedModel::new(disagreement_script());
    let selection =
        mc_dropout_max_variation_ratios(&mut model, &pool(3), &options(2, 2, 1)).unwrap();
    assert_eq!(selection.indices, vec![0, 2]);
    assert_eq!(selection.scores, vec![0.5, 0.5]);
}

#[test]
fn mean_std_tracks_spread_across_cycles() {
    let mut model = ScriptedModel::new(disagreement_script());
    let selection = mc_dropout_mean_std(&mut model, &pool(3), &options(1, 2, 3)).unwrap();
    assert_eq!(selection.indices, vec![2]);
    assert!((selection.scores[0] - 0.5).abs() < 1e-6);
}

#[test]
fn single_cycle_gives_zero_bald_and_std() {
    let output = Array2::from_shape_fn((10, 3), |(r, c)| if c == r % 3 { 0.8 } else { 0.1 });
    let mut model = ScriptedModel::constant(output);
    let scores = mc_dropout_multi(
        &mut model,
        &pool(10),
        &[Metric::Bald, Metric::MeanStd],
        &options(1, 1, 4),
    )
    .unwrap();
    for metric in [Metric::Bald, Metric::MeanStd] {
        assert!(scores[&metric].iter().all(|v| v.abs() < 1e-9), "{metric}");
    }
}

#[test]
fn dropout_is_stochastic_only_while_sampling() {
    let mut model = ScriptedModel::new(disagreement_script());
    mc_dropout_bald(&mut model, &pool(3), &options(1, 2, 2)).unwrap();
    assert_eq!(model.calls, 4);
    assert!(model.stochastic_during_calls.iter().all(|&on| on));
    assert!(!model.any_stochastic());
}

#[test]
fn inference_failure_restores_inference_mode() {
    let mut model = ScriptedModel::new(disagreement_script()).failing_on(2);
    let err = mc_dropout_bald(&mut model, &pool(3), &options(1, 3, 2)).unwrap_err();
    assert!(matches!(err, QueryError::Inference { cycle: 0, batch: 1, .. }));
    assert!(!model.any_stochastic());
}

#[test]
fn too_many_instances_never_touch_the_model() {
    let mut model = ScriptedModel::constant(Array2::zeros((3, 2)));
    let err = mc_dropout_mean_std(&mut model, &pool(3), &options(4, 2, 2)).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Configuration(ConfigurationError::TooManyInstances {
            requested: 4,
            available: 3
        })
    ));
    assert_eq!(model.calls, 0);
}

#[test]
fn selecting_a_non_dropout_layer_is_rejected() {
    let mut model = ScriptedModel::constant(Array2::zeros((3, 2)));
    let mut opts = options(1, 2, 2);
    opts.sampling.dropout_layer_indexes = vec![1, 2];
    let err = mc_dropout_bald(&mut model, &pool(3), &opts).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Configuration(ConfigurationError::NotDropoutLayer { index: 2, .. })
    ));
    assert_eq!(model.calls, 0);
    assert!(!model.any_stochastic());
}

#[test]
fn explicit_layer_selection_only_toggles_those_layers() {
    let mut model = ScriptedModel::constant(Array2::from_elem((3, 2), 0.5));
    let mut opts = options(1, 1, 3);
    opts.sampling.dropout_layer_indexes = vec![3];
    mc_dropout_bald(&mut model, &pool(3), &opts).unwrap();
    assert_eq!(model.stochastic_during_calls, vec![true]);
    assert!(!model.stochastic[1]);
}

#[test]
fn random_tie_break_spreads_picks_across_equal_scores() {
    let mut seen = BTreeSet::new();
    for seed in 0..10 {
        let mut model = ScriptedModel::constant(Array2::from_elem((10, 2), 0.5));
        let mut opts = options(3, 1, 10);
        opts.random_tie_break = true;
        opts.seed = Some(seed);
        let selection = mc_dropout_mean_std(&mut model, &pool(10), &opts).unwrap();
        let distinct: BTreeSet<usize> = selection.indices.iter().copied().collect();
        assert_eq!(distinct.len(), 3);
        assert!(distinct.iter().all(|&idx| idx < 10));
        seen.insert(selection.indices);
    }
    assert!(seen.len() > 1);
}

#[test]
fn keyed_pools_are_batched_in_step() {
    let keyed = PoolData::keyed([
        ("image", PoolData::from(Array2::<f32>::zeros((3, 4)))),
        ("meta", PoolData::from(Array2::<f32>::zeros((3, 1)))),
    ]);
    let mut model = ScriptedModel::new(disagreement_script());
    let selection = mc_dropout_bald(&mut model, &keyed, &options(1, 2, 2)).unwrap();
    assert_eq!(selection.indices, vec![2]);
}

#[test]
fn softmax_adaptor_turns_logits_into_probabilities() {
    let logits = array![[0.0f32, 0.0], [10.0, -10.0], [-10.0, 10.0]];
    let mut model = ScriptedModel::constant(logits);
    let selection = McDropout::new(options(1, 2, 3))
        .with_adaptor(SoftmaxAdaptor)
        .with_observer(NoopObserver)
        .max_entropy(&mut model, &pool(3))
        .unwrap();
    assert_eq!(selection.indices, vec![0]);
    assert!((selection.scores[0] - LN_2).abs() < 1e-6);
}
