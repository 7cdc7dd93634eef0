use std::f32::consts::PI;

use crate::{MlErr, Result};

/// Cosine annealing of the learning rate from `base_lr` towards `eta_min` over `t_max` steps:
/// `η_t = η_min + (η_base - η_min)(1 + cos(π t / T_max)) / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct CosineAnnealing {
    base_lr: f32,
    eta_min: f32,
    t_max: usize,
    t: usize,
}

impl CosineAnnealing {
    /// Creates a new `CosineAnnealing` schedule.
    ///
    /// # Arguments
    /// * `base_lr` - The learning rate at step zero.
    /// * `t_max` - The amount of steps of a half cosine period, must be positive.
    /// * `eta_min` - The learning rate reached after `t_max` steps.
    pub fn new(base_lr: f32, t_max: usize, eta_min: f32) -> Result<Self> {
        if t_max == 0 {
            return Err(MlErr::InvalidHyperparam {
                name: "t_max",
                reason: "the annealing period must be positive".into(),
            });
        }

        Ok(Self {
            base_lr,
            eta_min,
            t_max,
            t: 0,
        })
    }

    /// Advances the schedule by one step.
    ///
    /// # Returns
    /// The learning rate for the new step.
    pub fn step(&mut self) -> f32 {
        self.t += 1;
        self.learning_rate()
    }

    pub fn learning_rate(&self) -> f32 {
        let progress = self.t as f32 / self.t_max as f32;
        self.eta_min + (self.base_lr - self.eta_min) * (1. + (PI * progress).cos()) / 2.
    }

    pub fn steps(&self) -> usize {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anneals_to_eta_min() {
        let mut schedule = CosineAnnealing::new(1., 4, 0.).unwrap();
        assert_eq!(schedule.learning_rate(), 1.);

        let rates: Vec<f32> = (0..4).map(|_| schedule.step()).collect();
        assert!((rates[1] - 0.5).abs() < 1e-6);
        assert!(rates.windows(2).all(|w| w[1] < w[0]));
        assert!(rates[3].abs() < 1e-6);
    }

    #[test]
    fn eta_min_equal_to_base_keeps_rate_constant() {
        let mut schedule = CosineAnnealing::new(1e-4, 10, 1e-4).unwrap();
        for _ in 0..10 {
            assert!((schedule.step() - 1e-4).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(CosineAnnealing::new(0.1, 0, 0.).is_err());
    }
}
