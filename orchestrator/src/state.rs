/// The header of the metrics CSV, one column per `EpochMetrics` field.
pub const CSV_HEADER: &str =
    "epoch,train_loss,train_acc,train_avg_acc,val_loss,val_acc,val_avg_acc,elapsed_secs";

/// The outcome of one full epoch, training and validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_acc: f32,
    pub train_bal_acc: f32,
    pub val_loss: f32,
    pub val_acc: f32,
    pub val_bal_acc: f32,
    pub elapsed_secs: f64,
}

impl EpochMetrics {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.3}",
            self.epoch,
            self.train_loss,
            self.train_acc,
            self.train_bal_acc,
            self.val_loss,
            self.val_acc,
            self.val_bal_acc,
            self.elapsed_secs
        )
    }

    /// Compares every metric but the elapsed time.
    pub fn same_results(&self, other: &Self) -> bool {
        Self {
            elapsed_secs: other.elapsed_secs,
            ..*self
        } == *other
    }
}

/// The validation results of the best epoch so far.
///
/// Starts at all zeros and only moves on a strict improvement of the balanced accuracy, so
/// ties keep the earlier epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestState {
    pub loss: f32,
    pub accuracy: f32,
    pub balanced_accuracy: f32,
}

impl BestState {
    /// Takes the given validation results if they improve on the current best.
    ///
    /// # Returns
    /// Whether the results became the new best.
    pub fn observe(&mut self, loss: f32, accuracy: f32, balanced_accuracy: f32) -> bool {
        if balanced_accuracy <= self.balanced_accuracy {
            return false;
        }

        *self = Self {
            loss,
            accuracy,
            balanced_accuracy,
        };
        true
    }
}
