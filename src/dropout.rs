//! Dropout-mode control.
//!
//! Only dropout layers are touched; every other layer keeps whatever mode it had.
//! [`StochasticDropout`] scopes stochastic mode to a borrow of the model so that
//! inference mode is restored on every exit path, including errors and panics.

use crate::error::{ConfigurationError, QueryResult};
use crate::model::{DropoutModel, is_dropout_type};

/// Resolve which layers a selector targets.
///
/// An empty selector means every dropout layer. Explicit indices must all name
/// dropout layers.
pub fn resolve_dropout_layers<M: DropoutModel + ?Sized>(
    model: &M,
    layer_indexes: &[usize],
) -> Result<Vec<usize>, ConfigurationError> {
    let names = model.layer_type_names();
    if layer_indexes.is_empty() {
        return Ok(names
            .iter()
            .enumerate()
            .filter(|(_, name)| is_dropout_type(name))
            .map(|(idx, _)| idx)
            .collect());
    }
    let mut targets = Vec::with_capacity(layer_indexes.len());
    for &index in layer_indexes {
        let Some(name) = names.get(index) else {
            return Err(ConfigurationError::LayerIndexOutOfRange {
                index,
                layer_count: names.len(),
            });
        };
        if !is_dropout_type(name) {
            return Err(ConfigurationError::NotDropoutLayer {
                index,
                type_name: name.clone(),
            });
        }
        if !targets.contains(&index) {
            targets.push(index);
        }
    }
    Ok(targets)
}

/// Switch the selected dropout layers to stochastic (`train_mode = true`) or
/// inference mode.
///
/// The selector is validated before any layer changes, so a bad index leaves the
/// model untouched. Repeating a call is a no-op.
pub fn set_dropout_mode<M: DropoutModel + ?Sized>(
    model: &mut M,
    layer_indexes: &[usize],
    train_mode: bool,
) -> QueryResult<()> {
    let targets = resolve_dropout_layers(model, layer_indexes)?;
    for index in targets {
        model.set_layer_stochastic(index, train_mode);
    }
    Ok(())
}

/// Holds the selected dropout layers in stochastic mode for its lifetime.
pub struct StochasticDropout<'m, M: DropoutModel + ?Sized> {
    model: &'m mut M,
    targets: Vec<usize>,
}

impl<'m, M: DropoutModel + ?Sized> StochasticDropout<'m, M> {
    /// Enable stochastic mode on the selected layers.
    pub fn enable(model: &'m mut M, layer_indexes: &[usize]) -> QueryResult<Self> {
        let targets = resolve_dropout_layers(model, layer_indexes)?;
        for &index in &targets {
            model.set_layer_stochastic(index, true);
        }
        tracing::trace!(layers = ?targets, "dropout layers set to stochastic mode");
        Ok(Self { model, targets })
    }

    /// The model, with dropout still stochastic.
    pub fn model(&mut self) -> &mut M {
        &mut *self.model
    }

    /// Indices of the layers held in stochastic mode.
    pub fn layers(&self) -> &[usize] {
        &self.targets
    }
}

impl<M: DropoutModel + ?Sized> Drop for StochasticDropout<'_, M> {
    fn drop(&mut self) {
        for &index in &self.targets {
            self.model.set_layer_stochastic(index, false);
        }
        tracing::trace!(layers = ?self.targets, "dropout layers restored to inference mode");
    }
}
