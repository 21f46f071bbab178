use ndarray::{Array2, Ix2};

use super::{BatchStats, ParamManager};
use crate::{
    MlErr, Result,
    arch::{
        Model,
        loss::{LossFn, argmax},
    },
    dataset::Batch,
};

/// A model `Trainer`. Contains the model, its parameters and the loss function used to train it.
///
/// Optimization is left to the caller: `train_batch` only leaves the batch gradient in the
/// parameter manager, so it can be synchronized before being applied.
#[derive(Debug)]
pub struct ModelTrainer<M, L>
where
    M: Model,
    L: LossFn,
{
    model: M,
    params: ParamManager,
    loss_fn: L,
}

impl<M, L> ModelTrainer<M, L>
where
    M: Model,
    L: LossFn,
{
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `params` - The model's initial parameters.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output
    ///   and the expected one.
    ///
    /// # Returns
    /// A new `ModelTrainer` or an error if `params` doesn't fit the model.
    pub fn new(model: M, params: Vec<f32>, loss_fn: L) -> Result<Self> {
        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: params.len(),
                expected: model.size(),
            });
        }

        Ok(Self {
            model,
            params: ParamManager::from_params(params),
            loss_fn,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn params(&self) -> &ParamManager {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamManager {
        &mut self.params
    }

    /// Computes the loss and the gradient of a batch, leaving the gradient in the manager.
    pub fn train_batch(&mut self, batch: Batch) -> Result<BatchStats> {
        self.model.set_training(true);
        self.params.zero_grad();

        let Batch { x, labels } = batch;
        let logits = self.model.forward(&self.params, x.into_dyn())?;
        let logits = logits.into_dimensionality::<Ix2>()?;

        let stats = self.stats(&logits, &labels)?;
        let d = self.loss_fn.loss_prime(logits.view(), &labels)?;
        self.model.backward(&mut self.params, d.into_dyn())?;

        Ok(stats)
    }

    /// Evaluates a batch with dropout disabled, without touching the gradient.
    pub fn eval_batch(&mut self, batch: Batch) -> Result<BatchStats> {
        self.model.set_training(false);

        let Batch { x, labels } = batch;
        let logits = self.model.forward(&self.params, x.into_dyn())?;
        let logits = logits.into_dimensionality::<Ix2>()?;

        self.stats(&logits, &labels)
    }

    fn stats(&self, logits: &Array2<f32>, labels: &[usize]) -> Result<BatchStats> {
        let loss = self.loss_fn.loss(logits.view(), labels)?;
        let correct = argmax(logits.view())
            .into_iter()
            .zip(labels)
            .filter(|(pred, label)| pred == *label)
            .count();

        Ok(BatchStats {
            loss,
            correct,
            len: labels.len(),
        })
    }
}
