use ndarray::{Array2, ArrayView2};

use super::LossFn;
use crate::{MlErr, Result, arch::ops};

/// The smoothing factor applied by `CrossEntropy::smoothed`.
pub const SMOOTHING: f32 = 0.2;

/// Softmax cross-entropy between logits and integer labels, optionally label smoothed.
///
/// With smoothing `eps` the target of a sample is `1 - eps` on its gold class and
/// `eps / (classes - 1)` on every other class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossEntropy {
    smoothing: Option<f32>,
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::smoothed()
    }
}

impl CrossEntropy {
    /// Returns a label smoothed `CrossEntropy` with `eps = 0.2`.
    pub fn smoothed() -> Self {
        Self {
            smoothing: Some(SMOOTHING),
        }
    }

    /// Returns a standard `CrossEntropy` against one-hot targets.
    pub fn plain() -> Self {
        Self { smoothing: None }
    }

    pub fn smoothing(&self) -> Option<f32> {
        self.smoothing
    }

    /// Builds the target distribution of every row.
    ///
    /// # Errors
    /// `InvalidClassCount` when smoothing over a single class, `SizeMismatch` when the
    /// amount of labels differs from the amount of rows, `LabelOutOfRange` for labels
    /// not below the amount of classes.
    fn targets(&self, logits: &ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>> {
        let (rows, classes) = logits.dim();

        if classes == 0 || (classes == 1 && self.smoothing.is_some()) {
            return Err(MlErr::InvalidClassCount { classes });
        }

        if labels.len() != rows {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: labels.len(),
                expected: rows,
            });
        }

        if rows == 0 {
            return Err(MlErr::EmptyInput("logits"));
        }

        let (on, off) = match self.smoothing {
            Some(eps) => (1. - eps, eps / (classes - 1) as f32),
            None => (1., 0.),
        };

        let mut targets = Array2::from_elem((rows, classes), off);
        for (mut row, &label) in targets.rows_mut().into_iter().zip(labels) {
            if label >= classes {
                return Err(MlErr::LabelOutOfRange { label, classes });
            }
            row[label] = on;
        }

        Ok(targets)
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32> {
        let targets = self.targets(&logits, labels)?;
        let log_probs = ops::log_softmax_rows(logits);
        let total = -(targets * log_probs).sum();

        Ok(total / labels.len() as f32)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>> {
        let targets = self.targets(&logits, labels)?;
        let mut probs = logits.to_owned();
        ops::softmax_rows(probs.view_mut());

        let batch = labels.len() as f32;
        Ok((probs - targets) / batch)
    }
}
