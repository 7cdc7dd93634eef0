use std::{num::NonZeroUsize, ops::Range};

use log::debug;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis, s};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use super::{
    Mode, Pass,
    models::{ModelKind, Network},
};
use crate::{MlErr, Result, shard::shard_ranges};

/// A data-parallel predictor.
///
/// Holds one copy of the network per replica, all sharing a single parameter vector. Every
/// batch is split into contiguous shards, one per replica, which are run concurrently. The
/// logits are gathered back in order and the replicas' gradients are summed in replica order,
/// so the result only depends on the amount of replicas and not on thread timing.
#[derive(Debug)]
pub struct Replicated {
    replicas: Vec<Network>,
    replica_grads: Vec<Vec<f32>>,
    params: Vec<f32>,
    grad: Vec<f32>,
    shards: Vec<Range<usize>>,
    mode: Mode,
    rng: StdRng,
}

impl Replicated {
    /// Creates a new `Replicated` predictor with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `network` - The network to replicate.
    /// * `replicas` - The amount of copies to run concurrently.
    /// * `seed` - Seeds both the initial parameters and the dropout masks.
    ///
    /// # Returns
    /// A new `Replicated` in training mode, or an error if the network can't be initialized.
    pub fn new(network: Network, replicas: NonZeroUsize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = network.size();

        let mut params = vec![0.; size];
        network.init(&mut params, &mut rng)?;

        debug!(
            "replicating model: model={} replicas={} params={}",
            network.kind(),
            replicas,
            size
        );

        Ok(Self {
            replicas: vec![network; replicas.get()],
            replica_grads: vec![vec![0.; size]; replicas.get()],
            params,
            grad: vec![0.; size],
            shards: Vec::new(),
            mode: Mode::Train,
            rng,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.replicas[0].kind()
    }

    /// Returns the amount of parameters of the model.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn replicas(&self) -> usize {
        self.replicas.len()
    }

    pub fn describe(&self) -> String {
        self.replicas[0].describe()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches to training mode: dropout is active and activations are kept for `backward`.
    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    /// Switches to evaluation mode: dropout is the identity and gradients are disabled.
    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
        self.release_buffers();
    }

    /// Computes the logits of a batch of clouds, `(clouds × 3 × points)`.
    pub fn forward(&mut self, x: ArrayView3<f32>) -> Result<Array2<f32>> {
        let shards = shard_ranges(x.dim().0, self.replicas.len());
        if shards.is_empty() {
            return Err(MlErr::EmptyInput("batch"));
        }

        let seeds: Vec<u64> = shards.iter().map(|_| self.rng.random()).collect();
        let params = &self.params;
        let mode = self.mode;

        let outputs: Vec<Result<Array2<f32>>> = self.replicas[..shards.len()]
            .par_iter_mut()
            .zip(shards.par_iter())
            .zip(seeds.par_iter())
            .map(|((network, range), &seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut pass = Pass::new(mode, &mut rng);
                network.forward(params, x.slice(s![range.clone(), .., ..]), &mut pass)
            })
            .collect();

        let outputs = outputs.into_iter().collect::<Result<Vec<_>>>()?;
        let views: Vec<ArrayView2<f32>> = outputs.iter().map(|o| o.view()).collect();
        let logits = ndarray::concatenate(Axis(0), &views)?;

        self.shards = shards;
        Ok(logits)
    }

    /// Backpropagates the gradient of the loss with respect to the logits of the last
    /// forward pass, accumulating into the model's gradient.
    pub fn backward(&mut self, d: Array2<f32>) -> Result<()> {
        if self.mode == Mode::Eval {
            return Err(MlErr::GradientsDisabled);
        }

        let rows = self.shards.last().map_or(0, |r| r.end);
        if d.nrows() != rows {
            return Err(MlErr::SizeMismatch {
                what: "logit gradient rows",
                got: d.nrows(),
                expected: rows,
            });
        }

        let params = &self.params;
        let active = self.shards.len();

        self.replicas[..active]
            .par_iter_mut()
            .zip(self.replica_grads[..active].par_iter_mut())
            .zip(self.shards.par_iter())
            .map(|((network, grad), range)| {
                let d = d.slice(s![range.clone(), ..]).to_owned();
                network.backward(params, grad, d)
            })
            .collect::<Result<Vec<()>>>()?;

        self.grad.fill(0.);
        for replica_grad in &self.replica_grads {
            self.grad
                .iter_mut()
                .zip(replica_grad)
                .for_each(|(g, r)| *g += r);
        }

        Ok(())
    }

    /// Resets the accumulated gradient to zero.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.);
        self.replica_grads.iter_mut().for_each(|g| g.fill(0.));
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Gives the optimizer what it needs for a step: the parameters to update and the gradient.
    pub fn params_and_grad_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    /// Returns a snapshot of the parameters.
    pub fn state(&self) -> Vec<f32> {
        self.params.clone()
    }

    /// Replaces the parameters with a previously taken snapshot.
    pub fn load_state(&mut self, state: &[f32]) -> Result<()> {
        if state.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "model state",
                got: state.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(state);
        self.release_buffers();
        Ok(())
    }

    /// Drops every activation kept for backpropagation in every replica.
    pub fn release_buffers(&mut self) {
        self.replicas.iter_mut().for_each(Network::release);
        self.shards.clear();
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;
    use crate::arch::{
        loss::{CrossEntropy, LossFn},
        models::ArchSpec,
    };

    fn spec() -> ArchSpec {
        ArchSpec {
            num_classes: 4,
            num_points: 5,
            emb_dims: 8,
            k: 2,
            att_heads: 2,
            dropout: 0.,
        }
    }

    fn batch(clouds: usize) -> Array3<f32> {
        Array3::from_shape_fn((clouds, 3, 5), |(b, c, p)| ((b + 2 * c + 3 * p) as f32 * 0.21).cos())
    }

    fn replicated(kind: ModelKind, replicas: usize) -> Replicated {
        let network = kind.build(spec()).unwrap();
        Replicated::new(network, NonZeroUsize::new(replicas).unwrap(), 9).unwrap()
    }

    #[test]
    fn replicas_agree_with_a_single_copy() {
        let x = batch(5);
        let labels = [0, 1, 2, 3, 0];
        let loss = CrossEntropy::smoothed();

        let mut single = replicated(ModelKind::Dgcnn, 1);
        let mut triple = replicated(ModelKind::Dgcnn, 3);
        assert_eq!(single.params(), triple.params());

        let a = single.forward(x.view()).unwrap();
        let b = triple.forward(x.view()).unwrap();
        for (a, b) in a.iter().zip(&b) {
            assert!((a - b).abs() < 1e-5);
        }

        single.backward(loss.loss_prime(a.view(), &labels).unwrap()).unwrap();
        triple.backward(loss.loss_prime(b.view(), &labels).unwrap()).unwrap();
        for (a, b) in single.grad().iter().zip(triple.grad()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn more_replicas_than_clouds_is_fine() {
        let mut model = replicated(ModelKind::PointNet, 4);
        let logits = model.forward(batch(2).view()).unwrap();
        assert_eq!(logits.dim(), (2, 4));

        model.backward(Array2::ones((2, 4))).unwrap();
        assert!(model.grad().iter().any(|&g| g != 0.));
    }

    #[test]
    fn gradients_accumulate_until_zeroed() {
        let mut model = replicated(ModelKind::PointNet, 2);
        let x = batch(3);

        model.forward(x.view()).unwrap();
        model.backward(Array2::ones((3, 4))).unwrap();
        let once = model.grad().to_vec();

        model.forward(x.view()).unwrap();
        model.backward(Array2::ones((3, 4))).unwrap();
        for (twice, once) in model.grad().iter().zip(&once) {
            assert!((twice - 2. * once).abs() < 1e-4);
        }

        model.zero_grad();
        assert!(model.grad().iter().all(|&g| g == 0.));
    }

    #[test]
    fn eval_mode_disables_gradients() {
        let mut model = replicated(ModelKind::PointAttentionNet, 2);
        model.eval();

        let logits = model.forward(batch(2).view()).unwrap();
        let err = model.backward(Array2::ones(logits.raw_dim())).unwrap_err();
        assert!(matches!(err, MlErr::GradientsDisabled));
    }

    #[test]
    fn state_round_trips() {
        let mut source = replicated(ModelKind::AttentionDgcnn, 1);
        let mut params = source.state();
        params.iter_mut().for_each(|p| *p *= 0.5);
        source.load_state(&params).unwrap();

        let mut target = replicated(ModelKind::AttentionDgcnn, 2);
        target.load_state(&source.state()).unwrap();
        source.eval();
        target.eval();

        let x = batch(3);
        let a = source.forward(x.view()).unwrap();
        let b = target.forward(x.view()).unwrap();
        for (a, b) in a.iter().zip(&b) {
            assert!((a - b).abs() < 1e-5);
        }

        assert!(target.load_state(&params[1..]).is_err());
    }

    #[test]
    fn step_updates_params_through_optimizer() {
        use crate::optimization::{GradientDescentWithMomentum, Optimizer};

        let mut model = replicated(ModelKind::PointNet, 2);
        let before = model.state();
        let mut optimizer = GradientDescentWithMomentum::new(model.size(), 0.1, 0.9, 0.);

        model.forward(batch(2).view()).unwrap();
        model.backward(Array2::ones((2, 4))).unwrap();
        let (params, grad) = model.params_and_grad_mut();
        optimizer.update_params(grad, params).unwrap();

        assert_ne!(model.params(), before.as_slice());
    }
}
