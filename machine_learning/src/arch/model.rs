use ndarray::ArrayD;
use rand::Rng;

use crate::{Result, training::ParamManager};

/// A differentiable model whose parameters live outside of it, in a flat buffer.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Writes a fresh random initialization into `params`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, of length `size()`.
    /// * `rng` - The random number generator driving the initialization.
    fn init_params<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()>;

    /// Switches between training (dropout active) and evaluation mode.
    fn set_training(&mut self, training: bool);

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The manager holding the model's parameters.
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The output of the last layer or an error if occurred.
    fn forward(&mut self, params: &ParamManager, x: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Propagates the delta of the output backwards, **accumulating** the gradient of every layer
    /// into the manager's gradient buffer.
    ///
    /// # Arguments
    /// * `params` - The manager holding the model's parameters and gradient.
    /// * `d` - The derivative of the loss with respect to the model's output.
    fn backward(&mut self, params: &mut ParamManager, d: ArrayD<f32>) -> Result<()>;
}
