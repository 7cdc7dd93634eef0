use ndarray::{Array2, ArrayView3};
use rand::Rng;

use super::{ArchSpec, ModelKind};
use crate::{
    MlErr, Result,
    arch::{Pass, Sequential, layers::Layer},
};

/// A point-cloud classifier: takes a batch of clouds laid out channel first,
/// `(clouds × 3 × points)`, and produces one row of class logits per cloud.
#[derive(Clone, Debug)]
pub struct Network {
    kind: ModelKind,
    spec: ArchSpec,
    body: Sequential,
}

impl Network {
    pub(super) fn new(kind: ModelKind, spec: ArchSpec, layers: Vec<Layer>) -> Result<Self> {
        for (name, value) in [
            ("num_classes", spec.num_classes),
            ("num_points", spec.num_points),
            ("emb_dims", spec.emb_dims),
            ("k", spec.k),
        ] {
            if value == 0 {
                return Err(MlErr::InvalidHyperparam {
                    name,
                    reason: "must be positive".into(),
                });
            }
        }

        Ok(Self {
            kind,
            spec,
            body: Sequential::new(layers),
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn spec(&self) -> &ArchSpec {
        &self.spec
    }

    /// Returns the amount of parameters of the network.
    pub fn size(&self) -> usize {
        self.body.size()
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.body.init(params, rng)
    }

    /// Computes the logits of a batch of clouds.
    ///
    /// # Arguments
    /// * `params` - The network's parameters.
    /// * `x` - The batch, `(clouds × 3 × num_points)`.
    /// * `pass` - The context of this pass.
    ///
    /// # Returns
    /// A `(clouds × num_classes)` matrix of logits.
    pub fn forward(&mut self, params: &[f32], x: ArrayView3<f32>, pass: &mut Pass) -> Result<Array2<f32>> {
        let (clouds, channels, points) = x.dim();

        if clouds == 0 {
            return Err(MlErr::EmptyInput("batch"));
        }
        if channels != 3 {
            return Err(MlErr::SizeMismatch {
                what: "coordinate channels",
                got: channels,
                expected: 3,
            });
        }
        if points != self.spec.num_points {
            return Err(MlErr::SizeMismatch {
                what: "points per cloud",
                got: points,
                expected: self.spec.num_points,
            });
        }

        // One row per point, clouds stacked one after the other.
        let per_point = x.permuted_axes([0, 2, 1]);
        let rows = Array2::from_shape_vec((clouds * points, 3), per_point.iter().copied().collect())?;

        self.body.forward(params, rows, pass)
    }

    /// Backpropagates the gradient of the loss with respect to the last logits,
    /// accumulating the parameters' gradient into `grad`.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        self.body.backward(params, grad, d)?;
        Ok(())
    }

    /// Drops every activation kept for backpropagation.
    pub fn release(&mut self) {
        self.body.release();
    }

    /// A one line description of the network's layers, e.g.
    /// `PointNet [dense, leaky_relu, ...] (12345 params)`.
    pub fn describe(&self) -> String {
        let layers: Vec<&str> = self.body.layers().iter().map(Layer::kind).collect();
        format!("{} [{}] ({} params)", self.kind, layers.join(", "), self.size())
    }
}
