use std::{fmt, time::Instant};

use dataset::{DataLoader, LoaderOptions, Partition};
use log::{debug, info};
use machine_learning::{
    arch::{Replicated, loss::CrossEntropy},
    optimization::{Adam, CosineAnnealing, GradientDescentWithMomentum, Optimizer},
};

use crate::{
    Result, checkpoint,
    configs::{Configuration, OptimizerConfig},
    epoch::{self, PassOutput},
    report::RunLog,
    selector,
    state::{BestState, EpochMetrics},
};

/// Where a `TrainingOrchestrator` is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Training,
    Validating,
    Checkpointing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Training => "training",
            Self::Validating => "validating",
            Self::Checkpointing => "checkpointing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a finished run leaves behind besides its checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub best: BestState,
    pub history: Vec<EpochMetrics>,
    /// Whether the run stopped after a single training batch.
    pub dry_run: bool,
}

/// The result of recording one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochOutcome {
    pub metrics: EpochMetrics,
    /// Whether the epoch became the new best and was saved to the best slot.
    pub best_updated: bool,
}

/// Drives the epochs of a training run: schedule, train, validate, checkpoint.
pub struct TrainingOrchestrator {
    config: Configuration,
    train_loader: DataLoader,
    validation_loader: DataLoader,
    model: Replicated,
    optimizer: Box<dyn Optimizer + Send>,
    schedule: CosineAnnealing,
    loss: CrossEntropy,
    best: BestState,
    history: Vec<EpochMetrics>,
    log: RunLog,
    phase: Phase,
    epoch: usize,
}

impl TrainingOrchestrator {
    /// Prepares a training run: datasets, loaders, model, optimizer and schedule. When the
    /// configuration names a checkpoint to resume from, the model starts from its parameters.
    ///
    /// # Errors
    /// Any invalid configuration, unreadable dataset or checkpoint aborts the construction.
    pub fn new(config: Configuration) -> Result<Self> {
        config.validate()?;
        let mut log = RunLog::open(&config)?;

        let train_set = dataset::open(&config.dataset, Partition::Train, config.num_points, config.seed)?;
        let validation_set =
            dataset::open(&config.dataset, Partition::Validation, config.num_points, config.seed)?;

        let train_loader = DataLoader::new(
            train_set.clone(),
            LoaderOptions {
                batch_size: config.batch_size,
                shuffle: true,
                drop_last: true,
                augment: true,
                workers: config.workers,
                seed: config.seed,
                ..Default::default()
            },
        )?;
        let validation_loader = DataLoader::new(
            validation_set,
            LoaderOptions {
                batch_size: config.test_batch_size,
                shuffle: true,
                drop_last: false,
                augment: false,
                workers: config.workers,
                seed: config.seed.wrapping_add(1),
                ..Default::default()
            },
        )?;

        let mut model = selector::select(&config, train_set.num_classes())?;
        log.log(&model.describe(), false)?;

        let optimizer: Box<dyn Optimizer + Send> = match config.optimizer {
            OptimizerConfig::Sgd => {
                info!("using SGD: lr={} momentum={}", config.lr, config.momentum);
                Box::new(GradientDescentWithMomentum::new(
                    model.size(),
                    config.lr,
                    config.momentum,
                    config.weight_decay,
                ))
            }
            OptimizerConfig::Adam => {
                info!("using Adam: lr={}", config.lr);
                Box::new(Adam::with_defaults(model.size(), config.lr, config.weight_decay))
            }
        };

        let schedule = CosineAnnealing::new(config.lr, config.epochs.max(1), config.lr)?;

        if let Some(path) = config.last_checkpoint() {
            info!("resuming from checkpoint: path={}", path.display());
            let params = checkpoint::load(path, model.kind(), model.size())?;
            model.load_state(&params)?;
        }

        Ok(Self {
            loss: config.loss(),
            config,
            train_loader,
            validation_loader,
            model,
            optimizer,
            schedule,
            best: BestState::default(),
            history: Vec::new(),
            log,
            phase: Phase::Idle,
            epoch: 0,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn best(&self) -> &BestState {
        &self.best
    }

    pub fn history(&self) -> &[EpochMetrics] {
        &self.history
    }

    pub fn model(&self) -> &Replicated {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Replicated {
        &mut self.model
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    /// Runs every configured epoch, or a single training batch on a dry run.
    ///
    /// # Returns
    /// The best validation results and the metrics of every epoch.
    pub fn run(&mut self) -> Result<TrainingOutcome> {
        let mut dry_run = false;

        while self.epoch < self.config.epochs {
            if self.run_epoch()?.is_none() {
                dry_run = true;
                break;
            }
        }

        self.set_phase(Phase::Done);
        self.log.print_summary(&self.best)?;

        Ok(TrainingOutcome {
            best: self.best,
            history: self.history.clone(),
            dry_run,
        })
    }

    /// Runs the next epoch.
    ///
    /// # Returns
    /// The epoch's outcome, or `None` on a dry run, which stops right after training on the
    /// first batch without validating nor saving anything.
    pub fn run_epoch(&mut self) -> Result<Option<EpochOutcome>> {
        let epoch = self.epoch;
        let started = Instant::now();

        let lr = self.schedule.step();
        self.optimizer.set_learning_rate(lr);
        debug!("epoch starting: epoch={epoch} lr={lr}");

        self.set_phase(Phase::Training);
        let train = epoch::train_pass(
            &mut self.model,
            &mut self.train_loader,
            &self.loss,
            self.optimizer.as_mut(),
            epoch,
            self.config.dry_run,
        )?;
        self.epoch += 1;

        if self.config.dry_run {
            info!("dry run finished after {} training batch", train.batches);
            return Ok(None);
        }

        self.set_phase(Phase::Validating);
        let validation =
            epoch::validation_pass(&mut self.model, &mut self.validation_loader, &self.loss, epoch)?;

        let metrics = epoch_metrics(epoch, &train, &validation, started.elapsed().as_secs_f64())?;
        self.record_epoch(metrics).map(Some)
    }

    /// Records a finished epoch: the metrics row, the rolling checkpoint and, on a strict
    /// improvement of the validation balanced accuracy, the best checkpoint.
    pub fn record_epoch(&mut self, metrics: EpochMetrics) -> Result<EpochOutcome> {
        self.set_phase(Phase::Checkpointing);
        self.log.csv(&metrics)?;
        self.history.push(metrics);

        let kind = self.model.kind();
        checkpoint::save(&self.config.checkpoint_path(), kind, self.model.params())?;

        let best_updated = self
            .best
            .observe(metrics.val_loss, metrics.val_acc, metrics.val_bal_acc);
        if best_updated {
            info!(
                "new best model: epoch={} val_avg_acc={:.6}",
                metrics.epoch, metrics.val_bal_acc
            );
            checkpoint::save(&self.config.best_checkpoint_path(), kind, self.model.params())?;
        }

        self.model.release_buffers();
        Ok(EpochOutcome {
            metrics,
            best_updated,
        })
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!("phase transition: {} -> {phase}", self.phase);
        self.phase = phase;
    }
}

fn epoch_metrics(
    epoch: usize,
    train: &PassOutput,
    validation: &PassOutput,
    elapsed_secs: f64,
) -> Result<EpochMetrics> {
    Ok(EpochMetrics {
        epoch,
        train_loss: train.loss,
        train_acc: train.accuracy()?,
        train_bal_acc: train.balanced_accuracy()?,
        val_loss: validation.loss,
        val_acc: validation.accuracy()?,
        val_bal_acc: validation.balanced_accuracy()?,
        elapsed_secs,
    })
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use dataset::{DatasetConfig, SyntheticConfig};

    use super::*;

    fn config(dir: &std::path::Path) -> Configuration {
        Configuration {
            model: "PointNet".into(),
            epochs: 3,
            num_points: 16,
            emb_dims: 16,
            batch_size: 4,
            test_batch_size: 4,
            lr: 0.01,
            workers: 2,
            replicas: NonZeroUsize::new(2),
            output_dir: dir.to_path_buf(),
            dataset: DatasetConfig::Synthetic(SyntheticConfig {
                classes: 3,
                train: 12,
                validation: 6,
                test: 6,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn phases_advance_through_an_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = TrainingOrchestrator::new(config(dir.path())).unwrap();
        assert_eq!(orchestrator.phase(), Phase::Idle);

        let outcome = orchestrator.run_epoch().unwrap().unwrap();
        assert_eq!(orchestrator.phase(), Phase::Checkpointing);
        assert_eq!(outcome.metrics.epoch, 0);
        assert!(config(dir.path()).checkpoint_path().exists());

        let outcome = orchestrator.run().unwrap();
        assert_eq!(orchestrator.phase(), Phase::Done);
        assert_eq!(outcome.history.len(), 3);
    }

    #[test]
    fn learning_rate_stays_at_eta_min() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = TrainingOrchestrator::new(config(dir.path())).unwrap();
        orchestrator.run_epoch().unwrap();

        assert!((orchestrator.learning_rate() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_the_earlier_best() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = TrainingOrchestrator::new(config(dir.path())).unwrap();

        let metrics = |epoch, val_bal_acc| EpochMetrics {
            epoch,
            train_loss: 1.,
            train_acc: 0.5,
            train_bal_acc: 0.5,
            val_loss: 1. - val_bal_acc,
            val_acc: val_bal_acc,
            val_bal_acc,
            elapsed_secs: 0.,
        };

        let best_path = config(dir.path()).best_checkpoint_path();
        let mut updates = Vec::new();
        let mut best_files = Vec::new();

        for (epoch, bal) in [0.5, 0.5, 0.6].into_iter().enumerate() {
            // Every epoch ends with different parameters.
            let shifted: Vec<f32> = orchestrator.model().params().iter().map(|p| p + 1.).collect();
            orchestrator.model_mut().load_state(&shifted).unwrap();

            updates.push(orchestrator.record_epoch(metrics(epoch, bal)).unwrap().best_updated);
            best_files.push(std::fs::read(&best_path).unwrap());
        }

        assert_eq!(updates, vec![true, false, true]);
        assert_eq!(best_files[1], best_files[0]);
        assert_ne!(best_files[2], best_files[1]);

        let latest = checkpoint::load(
            &config(dir.path()).checkpoint_path(),
            orchestrator.model().kind(),
            orchestrator.model().size(),
        )
        .unwrap();
        assert_eq!(latest, orchestrator.model().state());
        assert!((orchestrator.best().balanced_accuracy - 0.6).abs() < 1e-6);
        assert_eq!(orchestrator.history().len(), 3);
    }

    #[test]
    fn invalid_configs_abort_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            lr: -1.,
            ..config(dir.path())
        };

        assert!(TrainingOrchestrator::new(config).is_err());
    }
}
