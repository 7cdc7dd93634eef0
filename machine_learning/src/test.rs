#![cfg(test)]

use std::num::NonZeroUsize;

use ndarray::Array3;

use crate::{
    arch::{
        Replicated,
        loss::{CrossEntropy, LossFn},
        models::{ArchSpec, ModelKind},
    },
    metrics,
    optimization::{Adam, Optimizer},
};

/// Clouds of 8 points stretched along the x axis (label 0) or the z axis (label 1).
fn stretched_clouds() -> (Array3<f32>, Vec<usize>) {
    let clouds = 8;
    let labels: Vec<usize> = (0..clouds).map(|i| i % 2).collect();

    let x = Array3::from_shape_fn((clouds, 3, 8), |(b, c, p)| {
        let along = (p as f32 - 3.5) / 3.5;
        let jitter = ((b * 13 + c * 5 + p * 7) as f32).sin() * 0.05;
        let axis = if labels[b] == 0 { 0 } else { 2 };
        if c == axis { along + jitter } else { jitter }
    });

    (x, labels)
}

fn train(kind: ModelKind, steps: usize) -> (f32, f32, f32) {
    let spec = ArchSpec {
        num_classes: 2,
        num_points: 8,
        emb_dims: 16,
        k: 4,
        att_heads: 2,
        dropout: 0.,
    };
    let network = kind.build(spec).unwrap();
    let mut model = Replicated::new(network, NonZeroUsize::new(2).unwrap(), 7).unwrap();
    let mut optimizer = Adam::with_defaults(model.size(), 1e-2, 0.);
    let loss = CrossEntropy::plain();
    let (x, labels) = stretched_clouds();

    let initial = loss.loss(model.forward(x.view()).unwrap().view(), &labels).unwrap();
    model.release_buffers();

    for _ in 0..steps {
        model.zero_grad();
        let logits = model.forward(x.view()).unwrap();
        model.backward(loss.loss_prime(logits.view(), &labels).unwrap()).unwrap();
        let (params, grad) = model.params_and_grad_mut();
        optimizer.update_params(grad, params).unwrap();
    }

    model.eval();
    let logits = model.forward(x.view()).unwrap();
    let last = loss.loss(logits.view(), &labels).unwrap();
    let acc = metrics::accuracy(&metrics::argmax_rows(logits.view()), &labels).unwrap();

    (initial, last, acc)
}

#[test]
fn test_point_net_separates_stretched_clouds() {
    let (initial, last, acc) = train(ModelKind::PointNet, 150);

    assert!(last < initial, "{last} >= {initial}");
    assert!(last < 0.1, "{last}");
    assert_eq!(acc, 1.);
}

#[test]
fn test_dgcnn_loss_decreases() {
    let (initial, last, _) = train(ModelKind::Dgcnn, 40);
    assert!(last < initial, "{last} >= {initial}");
}
