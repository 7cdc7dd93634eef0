use ndarray::Array2;
use rand::Rng;

use crate::{Result, arch::Pass};

#[derive(Clone, Debug)]
pub enum Layer {
    Dense(super::Dense),
    LeakyRelu(super::LeakyRelu),
    Dropout(super::Dropout),
    EdgeConv(super::EdgeConv),
    Attention(super::SelfAttention),
    MaxPool(super::GlobalMaxPool),
}

impl Layer {
    pub fn dense(dim: (usize, usize)) -> Self {
        Self::Dense(super::Dense::new(dim))
    }

    pub fn relu() -> Self {
        Self::leaky_relu(0.)
    }

    pub fn leaky_relu(slope: f32) -> Self {
        Self::LeakyRelu(super::LeakyRelu::new(slope))
    }

    pub fn dropout(p: f32) -> Result<Self> {
        Ok(Self::Dropout(super::Dropout::new(p)?))
    }

    pub fn edge_conv(dim: (usize, usize), k: usize, points: usize) -> Self {
        Self::EdgeConv(super::EdgeConv::new(dim, k, points))
    }

    pub fn attention(dim: usize, heads: usize, points: usize) -> Result<Self> {
        Ok(Self::Attention(super::SelfAttention::new(dim, heads, points)?))
    }

    pub fn max_pool(points: usize) -> Self {
        Self::MaxPool(super::GlobalMaxPool::new(points))
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
            Self::EdgeConv(l) => l.size(),
            Self::Attention(l) => l.size(),
            Self::LeakyRelu(_) | Self::Dropout(_) | Self::MaxPool(_) => 0,
        }
    }

    /// Writes this layer's initial parameters into `params`.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Dense(l) => l.init(params, rng),
            Self::EdgeConv(l) => l.init(params, rng),
            Self::Attention(l) => l.init(params, rng),
            Self::LeakyRelu(_) | Self::Dropout(_) | Self::MaxPool(_) => Ok(()),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: Array2<f32>, pass: &mut Pass) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.forward(params, x, pass),
            Self::LeakyRelu(l) => Ok(l.forward(x, pass)),
            Self::Dropout(l) => Ok(l.forward(x, pass)),
            Self::EdgeConv(l) => l.forward(params, x, pass),
            Self::Attention(l) => l.forward(params, x, pass),
            Self::MaxPool(l) => l.forward(x, pass),
        }
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.backward(params, grad, d),
            Self::LeakyRelu(l) => l.backward(d),
            Self::Dropout(l) => l.backward(d),
            Self::EdgeConv(l) => l.backward(params, grad, d),
            Self::Attention(l) => l.backward(params, grad, d),
            Self::MaxPool(l) => l.backward(d),
        }
    }

    /// Drops whatever the last forward pass kept for backpropagation.
    pub fn release(&mut self) {
        match self {
            Self::Dense(l) => l.release(),
            Self::LeakyRelu(l) => l.release(),
            Self::Dropout(l) => l.release(),
            Self::EdgeConv(l) => l.release(),
            Self::Attention(l) => l.release(),
            Self::MaxPool(l) => l.release(),
        }
    }

    /// A short human readable name of the layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dense(_) => "dense",
            Self::LeakyRelu(_) => "leaky_relu",
            Self::Dropout(_) => "dropout",
            Self::EdgeConv(_) => "edge_conv",
            Self::Attention(_) => "attention",
            Self::MaxPool(_) => "max_pool",
        }
    }
}
