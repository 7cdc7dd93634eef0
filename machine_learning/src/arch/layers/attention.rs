use ndarray::{linalg, prelude::*};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::cloud_count;
use crate::{MlErr, Result, arch::{Pass, ops}};

/// Multi-head scaled dot-product self-attention between the points of each cloud,
/// with a residual connection: `y = x + concat(softmax(Q_h K_hᵀ / √d_h) V_h) W_o + b_o`.
///
/// Parameters are laid out as `W_q | W_k | W_v | W_o | b_o`.
#[derive(Clone, Debug)]
pub struct SelfAttention {
    dim: usize,
    heads: usize,
    points: usize,
    cache: Option<AttentionCache>,
}

#[derive(Clone, Debug)]
struct AttentionCache {
    x: Array2<f32>,
    q: Array2<f32>,
    k: Array2<f32>,
    v: Array2<f32>,
    o: Array2<f32>,
    attn: Vec<Array2<f32>>,
}

type Projections<'a> = (
    ArrayView2<'a, f32>,
    ArrayView2<'a, f32>,
    ArrayView2<'a, f32>,
    ArrayView2<'a, f32>,
    ArrayView1<'a, f32>,
);

type ProjectionsMut<'a> = (
    ArrayViewMut2<'a, f32>,
    ArrayViewMut2<'a, f32>,
    ArrayViewMut2<'a, f32>,
    ArrayViewMut2<'a, f32>,
    ArrayViewMut1<'a, f32>,
);

impl SelfAttention {
    /// Creates a new `SelfAttention`.
    ///
    /// # Arguments
    /// * `dim` - The amount of features per point.
    /// * `heads` - The amount of attention heads, must divide `dim`.
    /// * `points` - The amount of points per cloud.
    ///
    /// # Returns
    /// An error if `heads` is zero or doesn't divide `dim`.
    pub fn new(dim: usize, heads: usize, points: usize) -> Result<Self> {
        if heads == 0 || dim % heads != 0 {
            return Err(MlErr::InvalidHyperparam {
                name: "att_heads",
                reason: format!("{heads} heads can't split {dim} features evenly"),
            });
        }

        Ok(Self {
            dim,
            heads,
            points,
            cache: None,
        })
    }

    pub fn size(&self) -> usize {
        4 * self.dim * self.dim + self.dim
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let std_dev = (1. / self.dim as f32).sqrt();
        let normal = Normal::new(0., std_dev).map_err(|e| MlErr::InvalidHyperparam {
            name: "attention dim",
            reason: e.to_string(),
        })?;

        let (w, b) = params.split_at_mut(4 * self.dim * self.dim);
        w.iter_mut().for_each(|w| *w = normal.sample(rng));
        b.fill(0.);
        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array2<f32>, pass: &Pass) -> Result<Array2<f32>> {
        if x.ncols() != self.dim {
            return Err(MlErr::SizeMismatch {
                what: "attention input features",
                got: x.ncols(),
                expected: self.dim,
            });
        }

        let n = self.points;
        let clouds = cloud_count(x.nrows(), n)?;
        let dh = self.dim / self.heads;
        let scale = 1. / (dh as f32).sqrt();

        let (wq, wk, wv, wo, bo) = self.view_params(params)?;
        let q = x.dot(&wq);
        let k = x.dot(&wk);
        let v = x.dot(&wv);

        let mut o = Array2::zeros(x.raw_dim());
        let mut attn = Vec::with_capacity(clouds * self.heads);

        for cloud in 0..clouds {
            let rows = cloud * n..(cloud + 1) * n;
            for h in 0..self.heads {
                let cols = h * dh..(h + 1) * dh;
                let qh = q.slice(s![rows.clone(), cols.clone()]);
                let kh = k.slice(s![rows.clone(), cols.clone()]);
                let vh = v.slice(s![rows.clone(), cols.clone()]);

                let mut a = qh.dot(&kh.t()) * scale;
                ops::softmax_rows(a.view_mut());
                o.slice_mut(s![rows.clone(), cols]).assign(&a.dot(&vh));

                if pass.training() {
                    attn.push(a);
                }
            }
        }

        let mut y = o.dot(&wo);
        y += &bo;
        y += &x;

        self.cache = pass.training().then_some(AttentionCache {
            x,
            q,
            k,
            v,
            o,
            attn,
        });

        Ok(y)
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<Array2<f32>> {
        let AttentionCache {
            x,
            q,
            k,
            v,
            o,
            attn,
        } = self.cache.take().ok_or(MlErr::GradientsDisabled)?;

        let n = self.points;
        let dh = self.dim / self.heads;
        let scale = 1. / (dh as f32).sqrt();
        let clouds = x.nrows() / n;

        let (wq, wk, wv, wo, _) = self.view_params(params)?;
        let (mut dwq, mut dwk, mut dwv, mut dwo, mut dbo) = self.view_grad(grad)?;

        linalg::general_mat_mul(1.0, &o.t(), &d, 1.0, &mut dwo);
        dbo += &d.sum_axis(Axis(0));
        let d_o = d.dot(&wo.t());

        let mut dq = Array2::zeros(q.raw_dim());
        let mut dk = Array2::zeros(k.raw_dim());
        let mut dv = Array2::zeros(v.raw_dim());

        for cloud in 0..clouds {
            let rows = cloud * n..(cloud + 1) * n;
            for h in 0..self.heads {
                let cols = h * dh..(h + 1) * dh;
                let a = &attn[cloud * self.heads + h];
                let doh = d_o.slice(s![rows.clone(), cols.clone()]);
                let qh = q.slice(s![rows.clone(), cols.clone()]);
                let kh = k.slice(s![rows.clone(), cols.clone()]);
                let vh = v.slice(s![rows.clone(), cols.clone()]);

                let da = doh.dot(&vh.t());
                let mut dvh = dv.slice_mut(s![rows.clone(), cols.clone()]);
                dvh += &a.t().dot(&doh);

                // Softmax jacobian applied row-wise: dS = A ⊙ (dA - rowsum(dA ⊙ A)).
                let dot = (&da * a).sum_axis(Axis(1)).insert_axis(Axis(1));
                let ds = (&da - &dot) * a * scale;

                let mut dqh = dq.slice_mut(s![rows.clone(), cols.clone()]);
                dqh += &ds.dot(&kh);
                let mut dkh = dk.slice_mut(s![rows.clone(), cols]);
                dkh += &ds.t().dot(&qh);
            }
        }

        linalg::general_mat_mul(1.0, &x.t(), &dq, 1.0, &mut dwq);
        linalg::general_mat_mul(1.0, &x.t(), &dk, 1.0, &mut dwk);
        linalg::general_mat_mul(1.0, &x.t(), &dv, 1.0, &mut dwv);

        let mut dx = d;
        dx += &dq.dot(&wq.t());
        dx += &dk.dot(&wk.t());
        dx += &dv.dot(&wv.t());
        Ok(dx)
    }

    pub fn release(&mut self) {
        self.cache = None;
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<Projections<'a>> {
        let dd = self.dim * self.dim;
        let shape = (self.dim, self.dim);
        let wq = ArrayView2::from_shape(shape, &params[..dd])?;
        let wk = ArrayView2::from_shape(shape, &params[dd..2 * dd])?;
        let wv = ArrayView2::from_shape(shape, &params[2 * dd..3 * dd])?;
        let wo = ArrayView2::from_shape(shape, &params[3 * dd..4 * dd])?;
        let bo = ArrayView1::from_shape(self.dim, &params[4 * dd..])?;
        Ok((wq, wk, wv, wo, bo))
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> Result<ProjectionsMut<'a>> {
        let dd = self.dim * self.dim;
        let shape = (self.dim, self.dim);
        let (wq, rest) = grad.split_at_mut(dd);
        let (wk, rest) = rest.split_at_mut(dd);
        let (wv, rest) = rest.split_at_mut(dd);
        let (wo, bo) = rest.split_at_mut(dd);
        Ok((
            ArrayViewMut2::from_shape(shape, wq)?,
            ArrayViewMut2::from_shape(shape, wk)?,
            ArrayViewMut2::from_shape(shape, wv)?,
            ArrayViewMut2::from_shape(shape, wo)?,
            ArrayViewMut1::from_shape(self.dim, bo)?,
        ))
    }
}
