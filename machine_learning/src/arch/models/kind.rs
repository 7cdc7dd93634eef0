use std::fmt;

use log::warn;

use super::{ArchSpec, Network, attention_dgcnn, dgcnn, point_attention_net, point_net};
use crate::Result;

/// The closed set of architectures a run can train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    PointNet,
    PointAttentionNet,
    AttentionDgcnn,
    Dgcnn,
}

impl ModelKind {
    pub const ALL: [Self; 4] = [
        Self::PointNet,
        Self::PointAttentionNet,
        Self::AttentionDgcnn,
        Self::Dgcnn,
    ];

    /// Looks up the architecture registered under `name`, if any.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Looks up the architecture registered under `name`.
    ///
    /// Any name outside the registry falls back to `Dgcnn`, loudly.
    pub fn from_name(name: &str) -> Self {
        Self::lookup(name).unwrap_or_else(|| {
            warn!("unknown model name, falling back to DGCNN: requested={name}");
            Self::Dgcnn
        })
    }

    /// The name this architecture is registered under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PointNet => "PointNet",
            Self::PointAttentionNet => "PointAttentionNet",
            Self::AttentionDgcnn => "AttentionDGCNN",
            Self::Dgcnn => "DGCNN",
        }
    }

    /// Builds a network of this architecture.
    ///
    /// # Arguments
    /// * `spec` - The hyperparameters of the network.
    ///
    /// # Returns
    /// The network, or an error if the hyperparameters can't describe it.
    pub fn build(&self, spec: ArchSpec) -> Result<Network> {
        let layers = match self {
            Self::PointNet => point_net::layers(&spec)?,
            Self::PointAttentionNet => point_attention_net::layers(&spec)?,
            Self::AttentionDgcnn => attention_dgcnn::layers(&spec)?,
            Self::Dgcnn => dgcnn::layers(&spec)?,
        };

        Network::new(*self, spec, layers)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
