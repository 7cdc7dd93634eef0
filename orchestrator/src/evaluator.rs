use std::path::Path;

use dataset::{DataLoader, LoaderOptions, Partition};
use log::{debug, info};
use machine_learning::{arch::Replicated, metrics};

use crate::{Result, checkpoint, configs::Configuration, epoch, report::RunLog, selector};

/// The test partition results of a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestReport {
    pub accuracy: f32,
    pub balanced_accuracy: f32,
}

/// Evaluates a trained model on the test partition.
///
/// # Arguments
/// * `config` - The run's configuration, it must describe the architecture that was trained.
/// * `state` - The checkpoint to evaluate, the best checkpoint of `config.output_dir` if `None`.
///
/// # Returns
/// The test accuracy and balanced accuracy, or an error if the checkpoint is missing or
/// doesn't match the architecture.
pub fn evaluate(config: &Configuration, state: Option<&Path>) -> Result<TestReport> {
    config.validate()?;
    let mut loader = test_loader(config)?;

    let mut model = selector::select(config, loader.dataset().num_classes())?;
    let best = config.best_checkpoint_path();
    let path = state.unwrap_or(best.as_path());
    info!("loading checkpoint: path={}", path.display());
    let params = checkpoint::load(path, model.kind(), model.size())?;
    model.load_state(&params)?;

    let report = run(&mut model, &mut loader)?;

    // An explicit checkpoint is an ad hoc evaluation, it stays off the console and the run's log.
    let message = format!(
        "Test :: test acc: {:.6}, test avg acc: {:.6}",
        report.accuracy, report.balanced_accuracy
    );
    if state.is_none() {
        RunLog::open(config)?.log(&message, true)?;
    } else {
        debug!("{message}");
    }

    Ok(report)
}

/// Evaluates an in-memory model on the test partition, leaving its parameters untouched.
pub fn evaluate_model(config: &Configuration, model: &mut Replicated) -> Result<TestReport> {
    let mut loader = test_loader(config)?;
    run(model, &mut loader)
}

fn test_loader(config: &Configuration) -> Result<DataLoader> {
    let test_set = dataset::open(&config.dataset, Partition::Test, config.num_points, config.seed)?;
    let options = LoaderOptions {
        batch_size: config.test_batch_size,
        shuffle: true,
        drop_last: false,
        augment: false,
        workers: config.workers,
        seed: config.seed.wrapping_add(2),
        ..Default::default()
    };

    Ok(DataLoader::new(test_set, options)?)
}

fn run(model: &mut Replicated, loader: &mut DataLoader) -> Result<TestReport> {
    let out = epoch::inference_pass(model, loader)?;

    Ok(TestReport {
        accuracy: metrics::accuracy(&out.predictions, &out.truths)?,
        balanced_accuracy: metrics::balanced_accuracy(&out.predictions, &out.truths)?,
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, num::NonZeroUsize};

    use dataset::{DatasetConfig, SyntheticConfig};
    use log::Level;

    use super::*;
    use crate::{OrchestratorError, test_log};

    fn config(dir: &Path) -> Configuration {
        Configuration {
            model: "PointNet".into(),
            num_points: 16,
            emb_dims: 16,
            test_batch_size: 4,
            workers: 2,
            replicas: NonZeroUsize::new(1),
            output_dir: dir.to_path_buf(),
            dataset: DatasetConfig::Synthetic(SyntheticConfig {
                classes: 3,
                train: 6,
                validation: 6,
                test: 9,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn missing_best_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(evaluate(&config(dir.path()), None).is_err());
    }

    #[test]
    fn evaluates_a_saved_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let mut model = selector::select(&config, 3).unwrap();
        checkpoint::save(&config.best_checkpoint_path(), model.kind(), model.params()).unwrap();

        let expected = evaluate_model(&config, &mut model).unwrap();
        let (report, lines) = test_log::captured(Level::Info, || evaluate(&config, None));
        let report = report.unwrap();
        assert_eq!(report, expected);
        assert_eq!(lines.iter().filter(|l| l.starts_with("Test :: ")).count(), 1);
        assert!((0. ..=1.).contains(&report.accuracy));

        let log = fs::read_to_string(config.log_path()).unwrap();
        assert!(log.contains("Test :: test acc: "));
    }

    #[test]
    fn explicit_checkpoints_stay_out_of_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let model = selector::select(&config, 3).unwrap();
        let state = dir.path().join("elsewhere.safetensors");
        checkpoint::save(&state, model.kind(), model.params()).unwrap();

        let (report, lines) =
            test_log::captured(Level::Info, || evaluate(&config, Some(state.as_path())));
        report.unwrap();

        assert!(!config.log_path().exists());
        assert!(lines.iter().all(|l| !l.starts_with("Test :: ")), "{lines:?}");
    }

    #[test]
    fn checkpoints_of_other_architectures_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let other = Configuration {
            model: "DGCNN".into(),
            k: 4,
            ..config.clone()
        };
        let model = selector::select(&other, 3).unwrap();
        checkpoint::save(&config.best_checkpoint_path(), model.kind(), model.params()).unwrap();

        assert!(matches!(
            evaluate(&config, None),
            Err(OrchestratorError::Checkpoint(_))
        ));
    }
}
