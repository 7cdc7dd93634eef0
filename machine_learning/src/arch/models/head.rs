use crate::{Result, arch::layers::Layer};

pub(super) const SLOPE: f32 = 0.2;

/// The classifier shared by every architecture, applied to the pooled cloud embedding:
/// `emb → 512 → 256 → classes` with leaky rectifiers and dropout in between.
pub(super) fn head(emb_dims: usize, num_classes: usize, dropout: f32) -> Result<Vec<Layer>> {
    Ok(vec![
        Layer::dense((emb_dims, 512)),
        Layer::leaky_relu(SLOPE),
        Layer::dropout(dropout)?,
        Layer::dense((512, 256)),
        Layer::leaky_relu(SLOPE),
        Layer::dropout(dropout)?,
        Layer::dense((256, num_classes)),
    ])
}
