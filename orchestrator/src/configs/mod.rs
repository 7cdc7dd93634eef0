mod optimizer;
mod training;

pub use dataset::DatasetConfig;
pub use optimizer::OptimizerConfig;
pub use training::Configuration;
