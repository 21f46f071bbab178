use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A loss over a batch of raw scores (one row per sample) and their class labels.
pub trait LossFn {
    /// Computes the mean loss of the batch.
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32>;

    /// Computes the derivative of `loss` with respect to each logit.
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>>;
}
