use ndarray::{linalg, prelude::*};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{MlErr, Result, arch::Pass};

/// A fully connected layer, `z = x·W + b`.
///
/// Works row-wise, so the same layer is used both as a shared per-point
/// transformation (one row per point) and as a classifier layer (one row per cloud).
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output features.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            x: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fills `params` with Kaiming normal weights and zero biases.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let (fan_in, _) = self.dim;
        let w_size = self.size - self.dim.1;
        let std_dev = (2. / fan_in as f32).sqrt();
        let normal = Normal::new(0., std_dev).map_err(|e| MlErr::InvalidHyperparam {
            name: "dense fan_in",
            reason: e.to_string(),
        })?;

        let (w, b) = params.split_at_mut(w_size);
        w.iter_mut().for_each(|w| *w = normal.sample(rng));
        b.fill(0.);
        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array2<f32>, pass: &Pass) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = pass.training().then_some(x);
        Ok(z)
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<Array2<f32>> {
        let x = self.x.take().ok_or(MlErr::GradientsDisabled)?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    pub fn release(&mut self) {
        self.x = None;
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }
}
