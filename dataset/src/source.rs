use std::{path::PathBuf, sync::Arc};

use log::info;
use serde::Deserialize;

use crate::{Partition, Result, Sample, local::Local, synthetic::Synthetic};

/// A source of labelled point clouds for one partition.
pub trait PointCloudDataset: Send + Sync {
    /// Returns the amount of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the amount of classes labels are drawn from.
    fn num_classes(&self) -> usize;

    /// Materializes the sample at `idx`, with exactly the configured amount of points.
    fn get(&self, idx: usize) -> Result<Sample>;
}

/// Where the point clouds of a run come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetConfig {
    /// Procedurally generated primitive shapes.
    Synthetic(SyntheticConfig),
    /// `<path>/<partition>.json` files.
    Local { path: PathBuf },
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Synthetic(SyntheticConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub classes: usize,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            classes: 6,
            train: 240,
            validation: 60,
            test: 60,
        }
    }
}

impl SyntheticConfig {
    fn samples(&self, partition: Partition) -> usize {
        match partition {
            Partition::Train => self.train,
            Partition::Validation => self.validation,
            Partition::Test => self.test,
        }
    }
}

/// Opens one partition of the configured dataset.
///
/// # Arguments
/// * `config` - Where the clouds come from.
/// * `partition` - The subset to open.
/// * `num_points` - The amount of points every cloud is cut or generated to.
/// * `seed` - Seeds the generation of synthetic clouds.
///
/// # Returns
/// The dataset, or an error if it can't be read or is empty.
pub fn open(
    config: &DatasetConfig,
    partition: Partition,
    num_points: usize,
    seed: u64,
) -> Result<Arc<dyn PointCloudDataset>> {
    let dataset: Arc<dyn PointCloudDataset> = match config {
        DatasetConfig::Synthetic(synthetic) => Arc::new(Synthetic::new(
            synthetic.classes,
            synthetic.samples(partition),
            num_points,
            partition,
            seed,
        )?),
        DatasetConfig::Local { path } => Arc::new(Local::load(path, partition, num_points)?),
    };

    info!(
        "opened dataset: partition={partition} samples={} classes={}",
        dataset.len(),
        dataset.num_classes()
    );

    Ok(dataset)
}
