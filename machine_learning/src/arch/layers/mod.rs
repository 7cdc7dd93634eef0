mod attention;
mod dense;
mod dropout;
mod edge_conv;
mod layer;
mod leaky_relu;
mod max_pool;

pub use attention::SelfAttention;
pub use dense::Dense;
pub use dropout::Dropout;
pub use edge_conv::EdgeConv;
pub use layer::Layer;
pub use leaky_relu::LeakyRelu;
pub use max_pool::GlobalMaxPool;

use crate::{MlErr, Result};

/// Returns how many clouds of `points` points there are in `rows` point rows.
pub(crate) fn cloud_count(rows: usize, points: usize) -> Result<usize> {
    if points == 0 || rows % points != 0 {
        return Err(MlErr::SizeMismatch {
            what: "point rows per cloud",
            got: rows,
            expected: points,
        });
    }

    Ok(rows / points)
}
