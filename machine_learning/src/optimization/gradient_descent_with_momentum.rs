use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Stochastic gradient descent with momentum and L2 weight decay.
///
/// Each step computes `g' = g + λp`, `v = μv + g'` and `p = p - ηv`.
#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Box<[f32]>,
    started: bool,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    /// * `weight_decay` - The L2 penalty added to the gradient.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(len: usize, learning_rate: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            weight_decay,
            velocity: vec![0.; len].into_boxed_slice(),
            started: false,
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(self.velocity.len(), grad, params)?;

        let lr = self.learning_rate;
        let mu = self.momentum;
        let wd = self.weight_decay;
        // The first step seeds the velocity with the gradient itself.
        let started = self.started;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.velocity.iter_mut())
            .for_each(|((p, g), v)| {
                let g = g + wd * *p;
                *v = if started { mu * *v + g } else { g };
                *p -= lr * *v;
            });

        self.started = true;
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlErr;

    #[test]
    fn velocity_accumulates() {
        let mut opt = GradientDescentWithMomentum::new(1, 0.1, 0.9, 0.);
        let mut params = [1.];

        opt.update_params(&[1.], &mut params).unwrap();
        assert!((params[0] - 0.9).abs() < 1e-6);

        opt.update_params(&[1.], &mut params).unwrap();
        // v = 0.9 * 1 + 1
        assert!((params[0] - (0.9 - 0.19)).abs() < 1e-6);
    }

    #[test]
    fn weight_decay_shrinks_params_without_gradient() {
        let mut opt = GradientDescentWithMomentum::new(2, 0.5, 0., 0.1);
        let mut params = [2., -2.];

        opt.update_params(&[0., 0.], &mut params).unwrap();
        assert!((params[0] - 1.9).abs() < 1e-6);
        assert!((params[1] + 1.9).abs() < 1e-6);
    }

    #[test]
    fn sizes_are_checked() {
        let mut opt = GradientDescentWithMomentum::new(2, 0.5, 0., 0.);
        let err = opt.update_params(&[0.], &mut [0., 0.]).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { what: "grad", .. }));
    }
}
