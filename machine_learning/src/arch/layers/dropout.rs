use ndarray::Array2;
use rand::Rng;

use crate::{MlErr, Result, arch::Pass};

/// Inverted dropout: zeroes activations with probability `p` while training and
/// rescales the survivors by `1 / (1 - p)`. Identity in evaluation mode.
#[derive(Clone, Debug, Default)]
pub struct Dropout {
    p: f32,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Returns
    /// An error if `p` is not within `[0, 1)`.
    pub fn new(p: f32) -> Result<Self> {
        if !(0. ..1.).contains(&p) {
            return Err(MlErr::InvalidHyperparam {
                name: "dropout",
                reason: format!("{p} is not within [0, 1)"),
            });
        }

        Ok(Self { p, mask: None })
    }

    pub fn forward(&mut self, mut x: Array2<f32>, pass: &mut Pass) -> Array2<f32> {
        if !pass.training() {
            return x;
        }

        let keep = 1. / (1. - self.p);
        let p = self.p;
        let rng = pass.rng();
        let mask = x.mapv(|_| if rng.random::<f32>() < p { 0. } else { keep });

        x *= &mask;
        self.mask = Some(mask);
        x
    }

    pub fn backward(&mut self, mut d: Array2<f32>) -> Result<Array2<f32>> {
        let mask = self.mask.take().ok_or(MlErr::GradientsDisabled)?;
        d *= &mask;
        Ok(d)
    }

    pub fn release(&mut self) {
        self.mask = None;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::Mode;

    #[test]
    fn eval_mode_is_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pass = Pass::new(Mode::Eval, &mut rng);
        let mut dropout = Dropout::new(0.5).unwrap();

        let x = Array2::from_elem((4, 4), 1.5);
        assert_eq!(dropout.forward(x.clone(), &mut pass), x);
    }

    #[test]
    fn train_mode_zeroes_or_rescales() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pass = Pass::new(Mode::Train, &mut rng);
        let mut dropout = Dropout::new(0.5).unwrap();

        let y = dropout.forward(Array2::ones((16, 16)), &mut pass);
        assert!(y.iter().all(|&v| v == 0. || v == 2.));
        assert!(y.iter().any(|&v| v == 0.));
        assert!(y.iter().any(|&v| v == 2.));

        let d = dropout.backward(Array2::ones((16, 16))).unwrap();
        assert_eq!(d, y);
    }

    #[test]
    fn invalid_probability() {
        assert!(Dropout::new(1.).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }
}
