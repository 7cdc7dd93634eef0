use ndarray::Axis;
use rand::{Rng, seq::SliceRandom};

use crate::Sample;

const SCALE: (f32, f32) = (2. / 3., 3. / 2.);
const SHIFT: (f32, f32) = (-0.2, 0.2);

/// Randomly scales each axis of the cloud, translates it and shuffles the order of its points.
/// The label is left untouched.
pub fn augment<R: Rng>(sample: &mut Sample, rng: &mut R) {
    let scale: [f32; 3] = std::array::from_fn(|_| rng.random_range(SCALE.0..SCALE.1));
    let shift: [f32; 3] = std::array::from_fn(|_| rng.random_range(SHIFT.0..SHIFT.1));

    for mut point in sample.points.rows_mut() {
        for axis in 0..3 {
            point[axis] = point[axis] * scale[axis] + shift[axis];
        }
    }

    let mut order: Vec<usize> = (0..sample.points.nrows()).collect();
    order.shuffle(rng);
    sample.points = sample.points.select(Axis(0), &order);
}
