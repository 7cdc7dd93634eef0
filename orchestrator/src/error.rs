use std::{fmt, io};

use dataset::DataErr;
use machine_learning::MlErr;

/// The orchestrator module's result type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur while training or evaluating.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before anything runs.
    InvalidConfig(String),
    /// A numerical component rejected its input.
    Ml(MlErr),
    /// A dataset couldn't be read or batched.
    Data(DataErr),
    /// An underlying I/O error not covered by the other variants.
    Io(io::Error),
    /// The configuration file isn't valid JSON for a `Configuration`.
    Json(serde_json::Error),
    /// A checkpoint couldn't be written, read or doesn't match the selected model.
    Checkpoint(String),
    /// A batch produced a NaN or infinite loss.
    NonFiniteLoss { epoch: usize, batch: usize, loss: f32 },
    /// A pass ended without seeing a single batch.
    EmptyPass(&'static str),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Ml(e) => write!(f, "model error: {e}"),
            Self::Data(e) => write!(f, "data error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "config parse error: {e}"),
            Self::Checkpoint(msg) => write!(f, "checkpoint error: {msg}"),
            Self::NonFiniteLoss { epoch, batch, loss } => {
                write!(f, "non-finite loss {loss} at epoch {epoch}, batch {batch}")
            }
            Self::EmptyPass(pass) => write!(f, "the {pass} pass saw no batches"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ml(e) => Some(e),
            Self::Data(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<DataErr> for OrchestratorError {
    fn from(e: DataErr) -> Self {
        Self::Data(e)
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<safetensors::SafeTensorError> for OrchestratorError {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(e.to_string())
    }
}
