use ndarray::{Array2, ArrayD, s};
use quarry::data::Batch;
use quarry::{DropoutModel, InferenceError, Passthrough};

/// Model that replays fixed per-cycle outputs for the whole pool.
///
/// Cycle `t` returns rows of `script[t % script.len()]`; batches are served in
/// pool order, so the row offset is derived from how many rows were consumed.
pub struct ScriptedModel {
    pub layers: Vec<String>,
    pub stochastic: Vec<bool>,
    pub script: Vec<Array2<f32>>,
    pub calls: usize,
    pub fail_on_call: Option<usize>,
    /// Whether any dropout layer was stochastic at each call.
    pub stochastic_during_calls: Vec<bool>,
    rows_consumed: usize,
}

impl ScriptedModel {
    pub fn new(script: Vec<Array2<f32>>) -> Self {
        let layers: Vec<String> = ["Linear", "Dropout", "ReLU", "Dropout2d", "Linear"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            stochastic: vec![false; layers.len()],
            layers,
            script,
            calls: 0,
            fail_on_call: None,
            stochastic_during_calls: Vec::new(),
            rows_consumed: 0,
        }
    }

    /// Same output every cycle.
    pub fn constant(output: Array2<f32>) -> Self {
        Self::new(vec![output])
    }

    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn any_stochastic(&self) -> bool {
        self.stochastic.iter().any(|&on| on)
    }
}

impl DropoutModel for ScriptedModel {
    fn layer_type_names(&self) -> Vec<String> {
        self.layers.clone()
    }

    fn set_layer_stochastic(&mut self, index: usize, stochastic: bool) {
        self.stochastic[index] = stochastic;
    }

    fn infer(
        &mut self,
        batch: &Batch<'_>,
        _passthrough: &Passthrough,
    ) -> Result<ArrayD<f32>, InferenceError> {
        self.calls += 1;
        self.stochastic_during_calls.push(self.any_stochastic());
        if self.fail_on_call == Some(self.calls) {
            return Err(InferenceError::Other("scripted failure".into()));
        }
        let pool_rows = self.script[0].nrows();
        let cycle = self.rows_consumed / pool_rows;
        let offset = self.rows_consumed % pool_rows;
        let rows = batch.n_rows();
        self.rows_consumed += rows;
        let output = &self.script[cycle % self.script.len()];
        Ok(output.slice(s![offset..offset + rows, ..]).to_owned().into_dyn())
    }
}
