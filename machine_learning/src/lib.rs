pub mod arch;
pub mod error;
pub mod metrics;
pub mod optimization;
pub mod shard;
mod test;

pub use error::{MlErr, Result};
