use super::{ArchSpec, head::head};
use crate::{Result, arch::layers::Layer};

/// A shared per-point dense stack followed by a symmetric max pool.
pub(super) fn layers(spec: &ArchSpec) -> Result<Vec<Layer>> {
    let mut layers = vec![
        Layer::dense((3, 64)),
        Layer::relu(),
        Layer::dense((64, 64)),
        Layer::relu(),
        Layer::dense((64, 128)),
        Layer::relu(),
        Layer::dense((128, spec.emb_dims)),
        Layer::relu(),
        Layer::max_pool(spec.num_points),
    ];

    layers.extend(head(spec.emb_dims, spec.num_classes, spec.dropout)?);
    Ok(layers)
}
