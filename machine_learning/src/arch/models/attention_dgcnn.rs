use super::{
    ArchSpec,
    head::{SLOPE, head},
};
use crate::{Result, arch::layers::Layer};

/// DGCNN with self-attention after each of the first two edge convolutions.
pub(super) fn layers(spec: &ArchSpec) -> Result<Vec<Layer>> {
    let (k, heads, n) = (spec.k, spec.att_heads, spec.num_points);
    let mut layers = vec![
        Layer::edge_conv((3, 64), k, n),
        Layer::attention(64, heads, n)?,
        Layer::edge_conv((64, 64), k, n),
        Layer::attention(64, heads, n)?,
        Layer::edge_conv((64, 128), k, n),
        Layer::dense((128, spec.emb_dims)),
        Layer::leaky_relu(SLOPE),
        Layer::max_pool(n),
    ];

    layers.extend(head(spec.emb_dims, spec.num_classes, spec.dropout)?);
    Ok(layers)
}
