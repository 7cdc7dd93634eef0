use log::info;
use machine_learning::arch::{Replicated, models::ModelKind};

use crate::{Result, configs::Configuration};

/// Builds the configured architecture and replicates it over the configured devices.
///
/// # Arguments
/// * `config` - The run's configuration.
/// * `num_classes` - The amount of classes of the dataset.
///
/// # Returns
/// The replicated model with freshly initialized parameters.
pub fn select(config: &Configuration, num_classes: usize) -> Result<Replicated> {
    let kind = ModelKind::from_name(&config.model);
    let network = kind.build(config.arch_spec(num_classes))?;
    let replicas = config.replicas();

    info!("selected model: model={kind} replicas={replicas} params={}", network.size());
    Ok(Replicated::new(network, replicas, config.seed)?)
}
