use crate::Result;

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the accumulated gradient.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad`, `params` and the optimizer state.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;

    /// Returns the learning rate used by the next update.
    fn learning_rate(&self) -> f32;

    /// Replaces the learning rate, used by schedules between epochs.
    fn set_learning_rate(&mut self, learning_rate: f32);
}

/// Checks that the gradient, the parameters and the optimizer's state all have `len` entries.
pub(super) fn check_sizes(len: usize, grad: &[f32], params: &[f32]) -> Result<()> {
    for (what, got) in [("grad", grad.len()), ("params", params.len())] {
        if got != len {
            return Err(crate::MlErr::SizeMismatch {
                what,
                got,
                expected: len,
            });
        }
    }

    Ok(())
}
