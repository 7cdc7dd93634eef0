use std::cmp::Ordering;

use ndarray::{linalg, prelude::*};
use rand::Rng;

use super::{Dense, LeakyRelu, cloud_count};
use crate::{MlErr, Result, arch::Pass};

const SLOPE: f32 = 0.2;

/// Dynamic graph edge convolution.
///
/// For every point `x_i` the `k` nearest points of its own cloud (itself included) are
/// found in the current feature space. Each edge is described by `[x_j - x_i, x_i]`,
/// projected by a shared dense transformation and max-aggregated over the neighborhood,
/// then passed through a leaky rectifier.
///
/// The neighborhood graph is treated as a constant when backpropagating.
#[derive(Clone, Debug)]
pub struct EdgeConv {
    dim: (usize, usize),
    k: usize,
    points: usize,
    size: usize,
    act: LeakyRelu,
    cache: Option<EdgeCache>,
}

#[derive(Clone, Debug)]
struct EdgeCache {
    edges: Array2<f32>,
    knn: Vec<usize>,
    argmax: Vec<usize>,
    zmax: Array2<f32>,
}

impl EdgeConv {
    /// Creates a new `EdgeConv`.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output features per point.
    /// * `k` - The neighborhood size, capped at the amount of points per cloud.
    /// * `points` - The amount of points per cloud.
    pub fn new(dim: (usize, usize), k: usize, points: usize) -> Self {
        Self {
            dim,
            k: k.min(points).max(1),
            points,
            size: (2 * dim.0 + 1) * dim.1,
            act: LeakyRelu::new(SLOPE),
            cache: None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        Dense::new((2 * self.dim.0, self.dim.1)).init(params, rng)
    }

    pub fn forward(&mut self, params: &[f32], x: Array2<f32>, pass: &Pass) -> Result<Array2<f32>> {
        let (c_in, c_out) = self.dim;
        if x.ncols() != c_in {
            return Err(MlErr::SizeMismatch {
                what: "edge conv input features",
                got: x.ncols(),
                expected: c_in,
            });
        }

        let rows = x.nrows();
        let clouds = cloud_count(rows, self.points)?;
        let k = self.k;

        let mut knn = Vec::with_capacity(rows * k);
        for cloud in 0..clouds {
            let offset = cloud * self.points;
            let xb = x.slice(s![offset..offset + self.points, ..]);
            knn.extend(nearest(xb, k).into_iter().map(|j| offset + j));
        }

        let mut edges = Array2::zeros((rows * k, 2 * c_in));
        for (r, mut edge) in edges.outer_iter_mut().enumerate() {
            let (i, j) = (r / k, knn[r]);
            for ch in 0..c_in {
                edge[ch] = x[[j, ch]] - x[[i, ch]];
                edge[c_in + ch] = x[[i, ch]];
            }
        }

        let (w, b) = self.view_params(params)?;
        let mut z = edges.dot(&w);
        z += &b;

        let mut zmax = Array2::from_elem((rows, c_out), f32::NEG_INFINITY);
        let mut argmax = vec![0; rows * c_out];
        for (r, z_row) in z.outer_iter().enumerate() {
            let (i, m) = (r / k, r % k);
            for (o, &v) in z_row.iter().enumerate() {
                if m == 0 || v > zmax[[i, o]] {
                    zmax[[i, o]] = v;
                    argmax[i * c_out + o] = m;
                }
            }
        }

        let out = zmax.mapv(|z| self.act.f(z));
        self.cache = pass.training().then_some(EdgeCache {
            edges,
            knn,
            argmax,
            zmax,
        });

        Ok(out)
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<Array2<f32>> {
        let EdgeCache {
            edges,
            knn,
            argmax,
            zmax,
        } = self.cache.take().ok_or(MlErr::GradientsDisabled)?;

        let (c_in, c_out) = self.dim;
        let k = self.k;
        let rows = zmax.nrows();

        let mut dz = Array2::zeros((rows * k, c_out));
        for ((i, o), &g) in d.indexed_iter() {
            let m = argmax[i * c_out + o];
            dz[[i * k + m, o]] = g * self.act.df(zmax[[i, o]]);
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &edges.t(), &dz, 1.0, &mut dw);
        db += &dz.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        let de = dz.dot(&w.t());

        let mut dx = Array2::zeros((rows, c_in));
        for (r, de_row) in de.outer_iter().enumerate() {
            let (i, j) = (r / k, knn[r]);
            for ch in 0..c_in {
                let diff = de_row[ch];
                dx[[j, ch]] += diff;
                dx[[i, ch]] += de_row[c_in + ch] - diff;
            }
        }

        Ok(dx)
    }

    pub fn release(&mut self) {
        self.cache = None;
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let (c_in, c_out) = self.dim;
        let (dw_raw, db_raw) = grad.split_at_mut(2 * c_in * c_out);
        let dw = ArrayViewMut2::from_shape((2 * c_in, c_out), dw_raw)?;
        let db = ArrayViewMut1::from_shape(c_out, db_raw)?;
        Ok((dw, db))
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let (c_in, c_out) = self.dim;
        let (w_raw, b_raw) = params.split_at(2 * c_in * c_out);
        let w = ArrayView2::from_shape((2 * c_in, c_out), w_raw)?;
        let b = ArrayView1::from_shape(c_out, b_raw)?;
        Ok((w, b))
    }
}

/// Finds the `k` nearest rows of every row of `x` (itself included), by squared
/// euclidean distance. Ties are broken by row index.
///
/// # Returns
/// A flat list with the `k` neighbor indices of row 0, then row 1 and so on.
fn nearest(x: ArrayView2<f32>, k: usize) -> Vec<usize> {
    let n = x.nrows();
    let gram = x.dot(&x.t());
    let mut out = Vec::with_capacity(n * k);
    let mut candidates: Vec<(f32, usize)> = Vec::with_capacity(n);

    for i in 0..n {
        candidates.clear();
        candidates.extend((0..n).map(|j| (gram[[i, i]] + gram[[j, j]] - 2. * gram[[i, j]], j)));

        let cmp = |a: &(f32, usize), b: &(f32, usize)| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        };

        if k < n {
            candidates.select_nth_unstable_by(k - 1, cmp);
        }
        let neighbors = &mut candidates[..k];
        neighbors.sort_unstable_by(cmp);
        out.extend(neighbors.iter().map(|&(_, j)| j));
    }

    out
}
