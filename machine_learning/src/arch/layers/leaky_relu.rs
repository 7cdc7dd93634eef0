use ndarray::Array2;

use crate::{MlErr, Result, arch::Pass};

/// Leaky rectifier, `max(z, slope * z)`. A zero slope gives a plain ReLU.
#[derive(Clone, Debug, Default)]
pub struct LeakyRelu {
    slope: f32,
    z: Option<Array2<f32>>,
}

impl LeakyRelu {
    pub fn new(slope: f32) -> Self {
        Self { slope, z: None }
    }

    pub fn f(&self, z: f32) -> f32 {
        if z > 0. { z } else { self.slope * z }
    }

    pub fn df(&self, z: f32) -> f32 {
        if z > 0. { 1. } else { self.slope }
    }

    pub fn forward(&mut self, z: Array2<f32>, pass: &Pass) -> Array2<f32> {
        let a = z.mapv(|z| self.f(z));
        self.z = pass.training().then_some(z);
        a
    }

    pub fn backward(&mut self, mut d: Array2<f32>) -> Result<Array2<f32>> {
        let z = self.z.take().ok_or(MlErr::GradientsDisabled)?;
        d.zip_mut_with(&z, |d, &z| *d *= self.df(z));
        Ok(d)
    }

    pub fn release(&mut self) {
        self.z = None;
    }
}
