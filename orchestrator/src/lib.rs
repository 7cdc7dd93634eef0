pub mod checkpoint;
pub mod configs;
pub mod epoch;
pub mod error;
pub mod evaluator;
pub mod report;
pub mod selector;
pub mod state;
mod test_log;
pub mod trainer;

use std::path::Path;

pub use error::{OrchestratorError, Result};
pub use evaluator::TestReport;
pub use state::{BestState, EpochMetrics};
pub use trainer::{Phase, TrainingOrchestrator, TrainingOutcome};

use crate::configs::Configuration;

/// Trains the configured model, saving the latest and best checkpoints to the output directory.
///
/// # Errors
/// Returns an `OrchestratorError` if the run can't be set up or any epoch fails.
pub fn train(config: Configuration) -> Result<TrainingOutcome> {
    log::info!(
        "starting training: model={} epochs={} dry_run={}",
        config.model_kind(),
        config.epochs,
        config.dry_run
    );
    let mut orchestrator = TrainingOrchestrator::new(config)?;
    orchestrator.run()
}

/// Evaluates a checkpoint on the test partition, the run's best checkpoint if `state` is `None`.
pub fn test(config: &Configuration, state: Option<&Path>) -> Result<TestReport> {
    log::info!("starting evaluation: model={}", config.model_kind());
    evaluator::evaluate(config, state)
}
