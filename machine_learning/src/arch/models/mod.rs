mod attention_dgcnn;
mod dgcnn;
mod head;
mod kind;
mod network;
mod point_attention_net;
mod point_net;

pub use kind::ModelKind;
pub use network::Network;

/// The hyperparameters every architecture is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchSpec {
    pub num_classes: usize,
    pub num_points: usize,
    pub emb_dims: usize,
    pub k: usize,
    pub att_heads: usize,
    pub dropout: f32,
}

impl Default for ArchSpec {
    fn default() -> Self {
        Self {
            num_classes: 40,
            num_points: 1024,
            emb_dims: 1024,
            k: 20,
            att_heads: 8,
            dropout: 0.5,
        }
    }
}
