use super::{
    ArchSpec,
    head::{SLOPE, head},
};
use crate::{Result, arch::layers::Layer};

/// Per-point features refined by self-attention between the points of each cloud.
pub(super) fn layers(spec: &ArchSpec) -> Result<Vec<Layer>> {
    let (heads, n) = (spec.att_heads, spec.num_points);
    let mut layers = vec![
        Layer::dense((3, 64)),
        Layer::leaky_relu(SLOPE),
        Layer::attention(64, heads, n)?,
        Layer::dense((64, 128)),
        Layer::leaky_relu(SLOPE),
        Layer::attention(128, heads, n)?,
        Layer::dense((128, spec.emb_dims)),
        Layer::leaky_relu(SLOPE),
        Layer::max_pool(n),
    ];

    layers.extend(head(spec.emb_dims, spec.num_classes, spec.dropout)?);
    Ok(layers)
}
