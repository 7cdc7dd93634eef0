use serde::Deserialize;

/// The optimization algorithm of a run, both with an L2 weight decay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic gradient descent with momentum.
    #[default]
    #[serde(rename = "SGD", alias = "sgd")]
    Sgd,
    #[serde(alias = "adam")]
    Adam,
}
