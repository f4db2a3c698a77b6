use ndarray::{Array2, ArrayD};
use quarry::data::Batch;
use quarry::sampler::NoopObserver;
use quarry::{
    ActiveLearner, DropoutModel, Estimator, InferenceError, McDropout, McDropoutStrategy, Metric,
    Passthrough, PoolData, QueryError, QueryOptions, QueryResult, QueryScores, QueryTarget,
    Sequential,
};

/// Fixed-weight network that only records how often it was fitted.
struct FrozenMlp {
    net: Sequential,
    fits: Vec<usize>,
}

impl FrozenMlp {
    fn new(seed: u64) -> Self {
        Self {
            net: Sequential::random_mlp(2, 16, 3, 0.5, seed),
            fits: Vec::new(),
        }
    }
}

impl Estimator for FrozenMlp {
    fn fit(&mut self, _x: &PoolData, y: &[usize]) -> QueryResult<()> {
        self.fits.push(y.len());
        Ok(())
    }

    fn predict_proba(&mut self, x: &PoolData) -> QueryResult<Array2<f32>> {
        let rows = x.rows()?;
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let input = Array2::from_shape_vec((flat.len() / width.max(1), width), flat)?;
        self.net
            .forward(input.view())
            .map_err(|err| QueryError::Estimator(err.to_string()))
    }
}

impl DropoutModel for FrozenMlp {
    fn layer_type_names(&self) -> Vec<String> {
        self.net.layer_type_names()
    }

    fn set_layer_stochastic(&mut self, index: usize, stochastic: bool) {
        self.net.set_layer_stochastic(index, stochastic);
    }

    fn infer(
        &mut self,
        batch: &Batch<'_>,
        passthrough: &Passthrough,
    ) -> Result<ArrayD<f32>, InferenceError> {
        self.net.infer(batch, passthrough)
    }
}

fn pool(rows: usize) -> PoolData {
    PoolData::from(Array2::from_shape_fn((rows, 2), |(r, c)| {
        ((r * 7 + c * 3) % 11) as f32 / 11.0 - 0.5
    }))
}

fn strategy(target: QueryTarget) -> McDropoutStrategy<'static> {
    let mut options = QueryOptions::with_instances(2);
    options.sampling.num_cycles = 10;
    options.sampling.sample_per_forward_pass = 5;
    McDropoutStrategy::new(McDropout::new(options).with_observer(NoopObserver), target)
}

#[test]
fn query_teach_loop_moves_rows_from_pool_to_training_set() {
    let mut learner = ActiveLearner::new(
        FrozenMlp::new(3),
        strategy(QueryTarget::Select(Metric::Bald)),
    );
    let mut remaining = pool(12);

    for round in 1..=3 {
        let report = learner.query(&remaining).unwrap();
        let indices = report.indices.unwrap();
        let instances = report.instances.unwrap();
        assert_eq!(indices.len(), 2);
        assert_eq!(instances, remaining.retrieve_rows(&indices).unwrap());
        let QueryScores::Selected(scores) = report.scores else {
            panic!("expected selected scores");
        };
        assert!(scores.iter().all(|s| *s >= -1e-9));

        learner.teach(instances, vec![round % 3, 0], false).unwrap();
        remaining = remaining.drop_rows(&indices).unwrap();
        assert_eq!(remaining.n_rows().unwrap(), 12 - 2 * round);
    }

    let (x, y) = learner.training_data().unwrap();
    assert_eq!(x.n_rows().unwrap(), 6);
    assert_eq!(y.len(), 6);
    assert_eq!(learner.estimator().fits, vec![2, 4, 6]);
    assert!(!learner.estimator().net.is_stochastic(2));
}

#[test]
fn score_target_returns_every_requested_metric() {
    let mut learner = ActiveLearner::new(
        FrozenMlp::new(8),
        strategy(QueryTarget::Scores(Metric::ALL.to_vec())),
    );
    let report = learner.query(&pool(9)).unwrap();
    assert!(report.indices.is_none());
    assert!(report.instances.is_none());
    let QueryScores::Metrics(scores) = report.scores else {
        panic!("expected metric scores");
    };
    assert_eq!(scores.len(), 4);
    assert!(scores.values().all(|values| values.len() == 9));
    let ratios = &scores[&Metric::MaxVariationRatios];
    assert!(ratios.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn learner_predictions_come_from_the_deterministic_network() {
    let mut learner = ActiveLearner::new(
        FrozenMlp::new(4),
        strategy(QueryTarget::Select(Metric::MaxEntropy)),
    );
    let first = learner.predict_proba(&pool(5)).unwrap();
    learner.query(&pool(5)).unwrap();
    let second = learner.predict_proba(&pool(5)).unwrap();
    assert_eq!(first, second);
    assert!(
        first
            .rows()
            .into_iter()
            .all(|row| (row.sum() - 1.0).abs() < 1e-5)
    );
}

#[test]
fn empty_score_target_scores_every_metric() {
    let mut learner = ActiveLearner::new(FrozenMlp::new(6), strategy(QueryTarget::Scores(vec![])));
    let report = learner.query(&pool(6)).unwrap();
    let QueryScores::Metrics(scores) = report.scores else {
        panic!("expected metric scores");
    };
    assert_eq!(scores.keys().copied().collect::<Vec<_>>(), Metric::ALL.to_vec());
    assert!(scores.values().all(|values| values.len() == 6));
}
