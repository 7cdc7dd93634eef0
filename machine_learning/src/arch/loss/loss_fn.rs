use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A loss over a batch of logits and their integer class labels.
pub trait LossFn {
    /// Computes the batch mean loss.
    ///
    /// # Arguments
    /// * `logits` - One row of unnormalized class scores per sample.
    /// * `labels` - The ground truth class of every row.
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32>;

    /// Computes the gradient of `loss` with respect to `logits`.
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>>;
}
