use ndarray::Array2;

use super::cloud_count;
use crate::{MlErr, Result, arch::Pass};

/// Symmetric aggregation over the points of each cloud: `(clouds * points, C) -> (clouds, C)`.
#[derive(Clone, Debug)]
pub struct GlobalMaxPool {
    points: usize,

    // Backward metadata: the winning row of each (cloud, channel).
    argmax: Option<(usize, Vec<usize>)>,
}

impl GlobalMaxPool {
    pub fn new(points: usize) -> Self {
        Self {
            points,
            argmax: None,
        }
    }

    pub fn forward(&mut self, x: Array2<f32>, pass: &Pass) -> Result<Array2<f32>> {
        let clouds = cloud_count(x.nrows(), self.points)?;
        let channels = x.ncols();
        let mut out = Array2::from_elem((clouds, channels), f32::NEG_INFINITY);
        let mut argmax: Vec<usize> = (0..clouds * channels)
            .map(|i| (i / channels) * self.points)
            .collect();

        for (row, x_row) in x.outer_iter().enumerate() {
            let cloud = row / self.points;
            for (c, &v) in x_row.iter().enumerate() {
                if v > out[[cloud, c]] {
                    out[[cloud, c]] = v;
                    argmax[cloud * channels + c] = row;
                }
            }
        }

        self.argmax = pass.training().then_some((x.nrows(), argmax));
        Ok(out)
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Result<Array2<f32>> {
        let (rows, argmax) = self.argmax.take().ok_or(MlErr::GradientsDisabled)?;
        let channels = d.ncols();
        let mut dx = Array2::zeros((rows, channels));

        for ((cloud, c), &g) in d.indexed_iter() {
            dx[[argmax[cloud * channels + c], c]] += g;
        }

        Ok(dx)
    }

    pub fn release(&mut self) {
        self.argmax = None;
    }
}
