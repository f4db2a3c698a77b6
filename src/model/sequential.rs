use std::collections::BTreeSet;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayD, ArrayView2, Axis, Ix2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{DropoutModel, Passthrough, softmax_in_place};
use crate::data::Batch;
use crate::error::InferenceError;

/// One layer of a [`Sequential`] network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// Dense affine map; `weights` is row-major `[out_features][in_features]`.
    Linear {
        in_features: usize,
        out_features: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    },
    Relu,
    /// Inverted dropout: kept activations are scaled by `1 / (1 - probability)`.
    Dropout { probability: f32 },
    /// Softmax over the feature axis.
    Softmax,
}

impl Layer {
    /// Type name reported to the dropout controller.
    pub fn type_name(&self) -> &'static str {
        match self {
            Layer::Linear { .. } => "Linear",
            Layer::Relu => "ReLU",
            Layer::Dropout { .. } => "Dropout",
            Layer::Softmax => "Softmax",
        }
    }
}

/// Feed-forward network over `[rows, features]` inputs with toggleable dropout.
///
/// Dropout layers start in inference mode. Masks are drawn from an RNG seeded with
/// `seed`, so a fresh model replays the same stochastic passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequential {
    pub model_version: i64,
    #[serde(default)]
    pub seed: u64,
    /// Name of the input to read from keyed batches.
    #[serde(default)]
    pub input_key: Option<String>,
    pub layers: Vec<Layer>,
    #[serde(skip)]
    stochastic: BTreeSet<usize>,
    #[serde(skip)]
    rng: Option<StdRng>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>, seed: u64) -> Self {
        Self {
            model_version: 1,
            seed,
            input_key: None,
            layers,
            stochastic: BTreeSet::new(),
            rng: None,
        }
    }

    /// Build a one-hidden-layer classifier with small random weights:
    /// `Linear -> ReLU -> Dropout -> Linear -> Softmax`.
    pub fn random_mlp(
        input: usize,
        hidden: usize,
        classes: usize,
        dropout: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = |len: usize| -> Vec<f32> {
            (0..len).map(|_| rng.random::<f32>() - 0.5).collect()
        };
        let layers = vec![
            Layer::Linear {
                in_features: input,
                out_features: hidden,
                weights: init(input * hidden),
                bias: init(hidden),
            },
            Layer::Relu,
            Layer::Dropout {
                probability: dropout,
            },
            Layer::Linear {
                in_features: hidden,
                out_features: classes,
                weights: init(hidden * classes),
                bias: init(classes),
            },
            Layer::Softmax,
        ];
        Self::new(layers, seed.wrapping_add(1))
    }

    /// Read the input from a named entry of keyed batches.
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    /// Validate structural invariants of the network.
    pub fn validate(&self) -> Result<(), String> {
        let mut width: Option<usize> = None;
        for (idx, layer) in self.layers.iter().enumerate() {
            match layer {
                Layer::Linear {
                    in_features,
                    out_features,
                    weights,
                    bias,
                } => {
                    if let Some(width) = width
                        && width != *in_features
                    {
                        return Err(format!(
                            "Layer {idx} expects {in_features} inputs but receives {width}"
                        ));
                    }
                    if weights.len() != in_features * out_features {
                        return Err(format!("Layer {idx} weights length mismatch"));
                    }
                    if bias.len() != *out_features {
                        return Err(format!("Layer {idx} bias length mismatch"));
                    }
                    width = Some(*out_features);
                }
                Layer::Dropout { probability } => {
                    if !(0.0..1.0).contains(probability) {
                        return Err(format!(
                            "Layer {idx} dropout probability {probability} outside [0, 1)"
                        ));
                    }
                }
                Layer::Relu | Layer::Softmax => {}
            }
        }
        Ok(())
    }

    /// Load a network from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, String> {
        let bytes = std::fs::read(path).map_err(|err| err.to_string())?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|err| err.to_string())?;
        model.validate()?;
        Ok(model)
    }

    /// Write the network to a JSON file. Dropout modes are not persisted.
    pub fn save_json(&self, path: &Path) -> Result<(), String> {
        let data = serde_json::to_vec_pretty(self).map_err(|err| err.to_string())?;
        std::fs::write(path, data).map_err(|err| err.to_string())
    }

    /// Whether the layer at `index` currently samples dropout masks.
    pub fn is_stochastic(&self, index: usize) -> bool {
        self.stochastic.contains(&index)
    }

    /// Forward pass over a `[rows, features]` matrix.
    pub fn forward(&mut self, input: ArrayView2<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        let seed = self.seed;
        let Self {
            layers,
            stochastic,
            rng,
            ..
        } = self;
        let rng = rng.get_or_insert_with(|| StdRng::seed_from_u64(seed));

        let mut act = input.to_owned();
        for (idx, layer) in layers.iter().enumerate() {
            match layer {
                Layer::Linear {
                    in_features,
                    out_features,
                    weights,
                    bias,
                } => {
                    if act.ncols() != *in_features {
                        return Err(InferenceError::InputShape {
                            expected: *in_features,
                            found: act.ncols(),
                        });
                    }
                    let w = ArrayView2::from_shape((*out_features, *in_features), weights)
                        .map_err(|err| InferenceError::Other(format!("layer {idx}: {err}")))?;
                    let b = Array1::from(bias.clone());
                    act = act.dot(&w.t()) + &b;
                }
                Layer::Relu => act.mapv_inplace(|v| v.max(0.0)),
                Layer::Dropout { probability } => {
                    let p = *probability;
                    if stochastic.contains(&idx) && p > 0.0 {
                        let scale = 1.0 / (1.0 - p);
                        act.mapv_inplace(|v| {
                            if rng.random::<f32>() >= p {
                                v * scale
                            } else {
                                0.0
                            }
                        });
                    }
                }
                Layer::Softmax => {
                    for row in act.lanes_mut(Axis(1)) {
                        softmax_in_place(row);
                    }
                }
            }
        }
        Ok(act)
    }
}

impl DropoutModel for Sequential {
    fn layer_type_names(&self) -> Vec<String> {
        self.layers
            .iter()
            .map(|layer| layer.type_name().to_string())
            .collect()
    }

    fn set_layer_stochastic(&mut self, index: usize, stochastic: bool) {
        if index >= self.layers.len() {
            return;
        }
        if stochastic {
            self.stochastic.insert(index);
        } else {
            self.stochastic.remove(&index);
        }
    }

    fn infer(
        &mut self,
        batch: &Batch<'_>,
        _passthrough: &Passthrough,
    ) -> Result<ArrayD<f32>, InferenceError> {
        let view = match batch {
            Batch::Dense(view) => view.clone(),
            Batch::Keyed(map) => match &self.input_key {
                Some(key) => map
                    .get(key.as_str())
                    .cloned()
                    .ok_or_else(|| InferenceError::MissingInput(key.clone()))?,
                None if map.len() == 1 => map.values().next().cloned().ok_or_else(|| {
                    InferenceError::UnexpectedInput("empty keyed batch".to_string())
                })?,
                None => {
                    return Err(InferenceError::UnexpectedInput(format!(
                        "{} named inputs but no input_key configured",
                        map.len()
                    )));
                }
            },
        };
        let matrix = view.into_dimensionality::<Ix2>().map_err(|_| {
            InferenceError::UnexpectedInput("expected a [rows, features] batch".to_string())
        })?;
        Ok(self.forward(matrix)?.into_dyn())
    }
}
