pub mod augment;
pub mod dataloader;
pub mod error;
pub mod local;
pub mod sample;
pub mod source;
pub mod synthetic;

pub use dataloader::{Batches, DataLoader, LoaderOptions};
pub use error::{DataErr, Result};
pub use sample::{Batch, Partition, Sample};
pub use source::{DatasetConfig, PointCloudDataset, SyntheticConfig, open};
