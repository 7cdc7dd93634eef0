use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidClassCount {
        classes: usize,
    },
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    InvalidHyperparam {
        name: &'static str,
        reason: String,
    },
    GradientsDisabled,
    EmptyInput(&'static str),
    Shape(ShapeError),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            MlErr::InvalidClassCount { classes } => write!(
                f,
                "Label smoothing needs at least two classes, the model outputs {classes}"
            ),
            MlErr::LabelOutOfRange { label, classes } => {
                write!(f, "Label {label} is out of range for {classes} classes")
            }
            MlErr::InvalidHyperparam { name, reason } => {
                write!(f, "Invalid value for {name}: {reason}")
            }
            MlErr::GradientsDisabled => write!(
                f,
                "Tried to backpropagate while the model is in evaluation mode"
            ),
            MlErr::EmptyInput(what) => write!(f, "Got an empty {what}"),
            MlErr::Shape(e) => write!(f, "Invalid array shape: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
