use std::{error::Error, fmt, io, path::PathBuf};

use ndarray::ShapeError;

/// The dataset module's result type.
pub type Result<T> = std::result::Result<T, DataErr>;

/// Failures while reading, generating or batching point clouds.
#[derive(Debug)]
pub enum DataErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    MalformedSample {
        index: usize,
        reason: String,
    },
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    EmptyPartition(&'static str),
    InvalidOption {
        name: &'static str,
        reason: String,
    },
    Shape(ShapeError),
    Pool(rayon::ThreadPoolBuildError),
    ProducerPanicked,
}

impl fmt::Display for DataErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            DataErr::Json { path, source } => {
                write!(f, "invalid dataset file {}: {source}", path.display())
            }
            DataErr::MalformedSample { index, reason } => {
                write!(f, "malformed sample {index}: {reason}")
            }
            DataErr::IndexOutOfRange { index, len } => {
                write!(f, "sample index {index} out of range for {len} samples")
            }
            DataErr::EmptyPartition(partition) => write!(f, "the {partition} partition is empty"),
            DataErr::InvalidOption { name, reason } => write!(f, "invalid {name}: {reason}"),
            DataErr::Shape(e) => write!(f, "batch shape error: {e}"),
            DataErr::Pool(e) => write!(f, "couldn't build the loader pool: {e}"),
            DataErr::ProducerPanicked => write!(f, "the batch producer thread panicked"),
        }
    }
}

impl Error for DataErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DataErr::Io { source, .. } => Some(source),
            DataErr::Json { source, .. } => Some(source),
            DataErr::Shape(e) => Some(e),
            DataErr::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for DataErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for DataErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::Pool(value)
    }
}
