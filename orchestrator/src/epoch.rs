use dataset::{Batch, DataLoader};
use log::debug;
use machine_learning::{
    arch::{Replicated, loss::LossFn},
    metrics,
    optimization::Optimizer,
};
use ndarray::ArrayView3;

use crate::{OrchestratorError, Result};

/// What a pass over a partition produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutput {
    /// The sample weighted mean loss of the pass.
    pub loss: f32,
    pub predictions: Vec<usize>,
    pub truths: Vec<usize>,
    pub batches: usize,
}

impl PassOutput {
    pub fn accuracy(&self) -> Result<f32> {
        Ok(metrics::accuracy(&self.predictions, &self.truths)?)
    }

    pub fn balanced_accuracy(&self) -> Result<f32> {
        Ok(metrics::balanced_accuracy(&self.predictions, &self.truths)?)
    }
}

/// The predictions of a pass that doesn't compute a loss.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predictions {
    pub predictions: Vec<usize>,
    pub truths: Vec<usize>,
}

#[derive(Default)]
struct Accumulator {
    weighted_loss: f64,
    samples: usize,
    batches: usize,
    predictions: Vec<usize>,
    truths: Vec<usize>,
}

impl Accumulator {
    fn push(&mut self, loss: f32, predictions: Vec<usize>, truths: Vec<usize>) {
        self.weighted_loss += loss as f64 * truths.len() as f64;
        self.samples += truths.len();
        self.batches += 1;
        self.predictions.extend(predictions);
        self.truths.extend(truths);
    }

    fn finish(self, pass: &'static str) -> Result<PassOutput> {
        if self.batches == 0 {
            return Err(OrchestratorError::EmptyPass(pass));
        }

        Ok(PassOutput {
            loss: (self.weighted_loss / self.samples as f64) as f32,
            predictions: self.predictions,
            truths: self.truths,
            batches: self.batches,
        })
    }
}

/// Lays the batch out the way networks take it, `(clouds × 3 × points)`.
fn channel_first(batch: &Batch) -> ArrayView3<'_, f32> {
    batch.points.view().permuted_axes([0, 2, 1])
}

fn checked(loss: f32, epoch: usize, batch: usize) -> Result<f32> {
    if !loss.is_finite() {
        return Err(OrchestratorError::NonFiniteLoss { epoch, batch, loss });
    }

    Ok(loss)
}

/// Trains the model for one epoch, one optimizer step per batch.
///
/// # Arguments
/// * `model` - The model to train.
/// * `loader` - The training batches.
/// * `loss_fn` - The loss to minimize.
/// * `optimizer` - Updates the parameters after every batch.
/// * `epoch` - The current epoch, for error reporting.
/// * `dry_run` - Stop after the first batch.
///
/// # Returns
/// The pass' mean loss and labels, or the first error found.
pub fn train_pass<L: LossFn>(
    model: &mut Replicated,
    loader: &mut DataLoader,
    loss_fn: &L,
    optimizer: &mut dyn Optimizer,
    epoch: usize,
    dry_run: bool,
) -> Result<PassOutput> {
    model.train();
    let mut acc = Accumulator::default();

    for (i, batch) in loader.iter().enumerate() {
        let batch = batch?;

        model.zero_grad();
        let logits = model.forward(channel_first(&batch))?;
        let loss = checked(loss_fn.loss(logits.view(), &batch.labels)?, epoch, i)?;
        model.backward(loss_fn.loss_prime(logits.view(), &batch.labels)?)?;

        let (params, grad) = model.params_and_grad_mut();
        optimizer.update_params(grad, params)?;

        debug!("train batch: epoch={epoch} batch={i} loss={loss:.6}");
        acc.push(loss, metrics::argmax_rows(logits.view()), batch.labels);

        if dry_run {
            break;
        }
    }

    model.release_buffers();
    acc.finish("train")
}

/// Evaluates the model on every batch, without gradients nor parameter updates.
pub fn validation_pass<L: LossFn>(
    model: &mut Replicated,
    loader: &mut DataLoader,
    loss_fn: &L,
    epoch: usize,
) -> Result<PassOutput> {
    model.eval();
    let mut acc = Accumulator::default();

    for (i, batch) in loader.iter().enumerate() {
        let batch = batch?;

        let logits = model.forward(channel_first(&batch))?;
        let loss = checked(loss_fn.loss(logits.view(), &batch.labels)?, epoch, i)?;
        acc.push(loss, metrics::argmax_rows(logits.view()), batch.labels);
    }

    model.release_buffers();
    acc.finish("validation")
}

/// Predicts the label of every cloud, without gradients.
pub fn inference_pass(model: &mut Replicated, loader: &mut DataLoader) -> Result<Predictions> {
    model.eval();
    let mut out = Predictions::default();

    for batch in loader.iter() {
        let batch = batch?;
        let logits = model.forward(channel_first(&batch))?;
        out.predictions.extend(metrics::argmax_rows(logits.view()));
        out.truths.extend(batch.labels);
    }

    model.release_buffers();
    if out.truths.is_empty() {
        return Err(OrchestratorError::EmptyPass("inference"));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use dataset::{DatasetConfig, LoaderOptions, Partition, SyntheticConfig};
    use machine_learning::{
        arch::{
            loss::CrossEntropy,
            models::{ArchSpec, ModelKind},
        },
        optimization::GradientDescentWithMomentum,
    };

    use super::*;

    const POINTS: usize = 16;

    fn model() -> Replicated {
        let spec = ArchSpec {
            num_classes: 3,
            num_points: POINTS,
            emb_dims: 16,
            k: 4,
            att_heads: 2,
            dropout: 0.5,
        };
        let network = ModelKind::PointNet.build(spec).unwrap();
        Replicated::new(network, NonZeroUsize::new(2).unwrap(), 1).unwrap()
    }

    fn loader(samples: usize, batch_size: usize, drop_last: bool) -> DataLoader {
        let config = DatasetConfig::Synthetic(SyntheticConfig {
            classes: 3,
            train: samples,
            validation: samples,
            test: samples,
        });
        let dataset = dataset::open(&config, Partition::Train, POINTS, 3).unwrap();
        let options = LoaderOptions {
            batch_size,
            drop_last,
            shuffle: true,
            workers: 2,
            ..Default::default()
        };

        DataLoader::new(dataset, options).unwrap()
    }

    #[test]
    fn training_drops_the_partial_batch_and_steps_per_batch() {
        let mut model = model();
        let mut optimizer = GradientDescentWithMomentum::new(model.size(), 0.01, 0.9, 1e-4);
        let before = model.state();

        let out = train_pass(
            &mut model,
            &mut loader(10, 4, true),
            &CrossEntropy::smoothed(),
            &mut optimizer,
            0,
            false,
        )
        .unwrap();

        assert_eq!(out.batches, 2);
        assert_eq!(out.truths.len(), 8);
        assert_eq!(out.predictions.len(), 8);
        assert!(out.loss.is_finite() && out.loss > 0.);
        assert_ne!(model.state(), before);
    }

    #[test]
    fn dry_run_stops_after_one_batch() {
        let mut model = model();
        let mut optimizer = GradientDescentWithMomentum::new(model.size(), 0.01, 0.9, 1e-4);

        let out = train_pass(
            &mut model,
            &mut loader(12, 4, true),
            &CrossEntropy::smoothed(),
            &mut optimizer,
            0,
            true,
        )
        .unwrap();

        assert_eq!(out.batches, 1);
        assert_eq!(out.truths.len(), 4);
    }

    #[test]
    fn validation_keeps_every_sample_and_params() {
        let mut model = model();
        let before = model.state();

        let out = validation_pass(&mut model, &mut loader(10, 4, false), &CrossEntropy::smoothed(), 0)
            .unwrap();

        assert_eq!(out.batches, 3);
        assert_eq!(out.truths.len(), 10);
        assert_eq!(model.state(), before);
        assert!((0. ..=1.).contains(&out.accuracy().unwrap()));
        assert!((0. ..=1.).contains(&out.balanced_accuracy().unwrap()));
    }

    #[test]
    fn validation_is_repeatable() {
        let mut model = model();
        let loss = CrossEntropy::smoothed();

        let a = validation_pass(&mut model, &mut loader(9, 4, false), &loss, 0).unwrap();
        let b = validation_pass(&mut model, &mut loader(9, 4, false), &loss, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inference_predicts_every_cloud() {
        let mut model = model();
        let out = inference_pass(&mut model, &mut loader(7, 3, false)).unwrap();

        assert_eq!(out.predictions.len(), 7);
        assert!(out.predictions.iter().all(|&p| p < 3));
    }

    #[test]
    fn mean_loss_is_weighted_by_batch_size() {
        let mut acc = Accumulator::default();
        acc.push(1., vec![0; 4], vec![0; 4]);
        acc.push(4., vec![0; 2], vec![0; 2]);

        let out = acc.finish("train").unwrap();
        assert!((out.loss - 2.).abs() < 1e-6);
    }

    #[test]
    fn passes_without_batches_are_errors() {
        assert!(matches!(
            Accumulator::default().finish("validation"),
            Err(OrchestratorError::EmptyPass("validation"))
        ));
    }

    #[test]
    fn non_finite_losses_are_reported() {
        assert!(matches!(
            checked(f32::NAN, 2, 5),
            Err(OrchestratorError::NonFiniteLoss { epoch: 2, batch: 5, .. })
        ));
        assert_eq!(checked(0.5, 0, 0).unwrap(), 0.5);
    }
}
