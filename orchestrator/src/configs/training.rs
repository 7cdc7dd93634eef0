use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use dataset::DatasetConfig;
use machine_learning::arch::{
    loss::CrossEntropy,
    models::{ArchSpec, ModelKind},
};
use serde::Deserialize;

use super::OptimizerConfig;
use crate::{OrchestratorError, Result};

const CHECKPOINT_FILE: &str = "checkpoint.safetensors";
const BEST_CHECKPOINT_FILE: &str = "best_model.safetensors";
const LOG_FILE: &str = "run.log";
const CSV_FILE: &str = "metrics.csv";

/// The attention widths of the attention architectures, the heads must split them evenly.
const ATTENTION_WIDTHS: [usize; 2] = [64, 128];

/// Everything a training or evaluation run is parameterized by.
///
/// Every field is optional in the JSON file and defaults to the values of `Default`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// The registered architecture name, unknown names fall back to `DGCNN`.
    pub model: String,
    pub epochs: usize,
    pub num_points: usize,
    pub emb_dims: usize,
    /// The neighborhood size of edge convolutions.
    pub k: usize,
    pub optimizer: OptimizerConfig,
    pub lr: f32,
    pub momentum: f32,
    pub weight_decay: f32,
    pub att_heads: usize,
    pub dropout: f32,
    pub batch_size: usize,
    pub test_batch_size: usize,
    pub label_smoothing: bool,
    /// The amount of threads materializing samples of each loader.
    pub workers: usize,
    /// The amount of model replicas, the available parallelism when missing.
    pub replicas: Option<NonZeroUsize>,
    pub seed: u64,
    /// Whether the run log and the metrics are written to `output_dir`.
    pub dump_file: bool,
    #[serde(alias = "dry_ryn")]
    pub dry_run: bool,
    pub output_dir: PathBuf,
    /// A checkpoint to resume from, empty for a fresh start.
    pub last_checkpoint: String,
    pub dataset: DatasetConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            model: "DGCNN".into(),
            epochs: 1,
            num_points: 1024,
            emb_dims: 1024,
            k: 20,
            optimizer: OptimizerConfig::Sgd,
            lr: 1e-4,
            momentum: 0.9,
            weight_decay: 1e-4,
            att_heads: 8,
            dropout: 0.5,
            batch_size: 32,
            test_batch_size: 16,
            label_smoothing: true,
            workers: 8,
            replicas: None,
            seed: 42,
            dump_file: true,
            dry_run: false,
            output_dir: PathBuf::from("./tmp/output"),
            last_checkpoint: String::new(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl Configuration {
    /// Reads a configuration from a JSON file and validates it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the hyperparameters can describe a run.
    ///
    /// # Errors
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(OrchestratorError::InvalidConfig(msg));

        for (name, value) in [
            ("num_points", self.num_points),
            ("emb_dims", self.emb_dims),
            ("k", self.k),
            ("att_heads", self.att_heads),
            ("batch_size", self.batch_size),
            ("test_batch_size", self.test_batch_size),
            ("workers", self.workers),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }

        if !(self.lr.is_finite() && self.lr > 0.) {
            return invalid(format!("lr must be positive, got {}", self.lr));
        }
        if !(0. ..1.).contains(&self.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !(0. ..1.).contains(&self.momentum) {
            return invalid(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.) {
            return invalid(format!("weight_decay must be non negative, got {}", self.weight_decay));
        }

        let attends = matches!(
            self.model_kind(),
            ModelKind::PointAttentionNet | ModelKind::AttentionDgcnn
        );
        if attends {
            if let Some(width) = ATTENTION_WIDTHS.iter().find(|&&w| w % self.att_heads != 0) {
                return invalid(format!(
                    "att_heads ({}) must divide the attention width {width}",
                    self.att_heads
                ));
            }
        }

        Ok(())
    }

    /// Returns the checkpoint to resume from, if any.
    pub fn last_checkpoint(&self) -> Option<&Path> {
        (!self.last_checkpoint.is_empty()).then(|| Path::new(&self.last_checkpoint))
    }

    /// The rolling checkpoint, overwritten every epoch.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(CHECKPOINT_FILE)
    }

    /// The checkpoint of the epoch with the best validation balanced accuracy.
    pub fn best_checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(BEST_CHECKPOINT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(CSV_FILE)
    }

    /// The amount of model replicas to train with.
    pub fn replicas(&self) -> NonZeroUsize {
        self.replicas
            .or_else(|| thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// The architecture to train, `Dgcnn` for unregistered names.
    ///
    /// Silent on the fallback, `selector::select` reports it once per model built.
    pub fn model_kind(&self) -> ModelKind {
        ModelKind::lookup(&self.model).unwrap_or(ModelKind::Dgcnn)
    }

    pub fn arch_spec(&self, num_classes: usize) -> ArchSpec {
        ArchSpec {
            num_classes,
            num_points: self.num_points,
            emb_dims: self.emb_dims,
            k: self.k,
            att_heads: self.att_heads,
            dropout: self.dropout,
        }
    }

    pub fn loss(&self) -> CrossEntropy {
        if self.label_smoothing {
            CrossEntropy::smoothed()
        } else {
            CrossEntropy::plain()
        }
    }
}
