use std::f32::consts::TAU;

use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};

use crate::{DataErr, Partition, PointCloudDataset, Result, Sample, sample::mix};

const FAMILIES: usize = 6;
const NOISE: f32 = 0.01;

/// Procedurally generated clouds sampled from the surface of primitive shapes.
///
/// Labels are assigned round-robin, so every class is equally represented. A class picks a
/// shape family (sphere, cube, cylinder, cone, torus or plane) and, past the first six classes,
/// a vertical stretch that tells apart classes of the same family. Every sample is generated
/// from its own seed, so samples can be materialized in any order and on any thread.
#[derive(Debug, Clone)]
pub struct Synthetic {
    classes: usize,
    samples: usize,
    num_points: usize,
    seed: u64,
}

impl Synthetic {
    pub fn new(
        classes: usize,
        samples: usize,
        num_points: usize,
        partition: Partition,
        seed: u64,
    ) -> Result<Self> {
        if classes == 0 {
            return Err(DataErr::InvalidOption {
                name: "classes",
                reason: "a dataset needs at least one class".into(),
            });
        }
        if num_points == 0 {
            return Err(DataErr::InvalidOption {
                name: "num_points",
                reason: "clouds need at least one point".into(),
            });
        }
        if samples == 0 {
            return Err(DataErr::EmptyPartition(partition.name()));
        }

        Ok(Self {
            classes,
            samples,
            num_points,
            seed: mix(seed, partition.stream(), 0),
        })
    }
}

impl PointCloudDataset for Synthetic {
    fn len(&self) -> usize {
        self.samples
    }

    fn num_classes(&self) -> usize {
        self.classes
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        if idx >= self.samples {
            return Err(DataErr::IndexOutOfRange {
                index: idx,
                len: self.samples,
            });
        }

        let label = idx % self.classes;
        let mut rng = StdRng::seed_from_u64(mix(self.seed, idx as u64, 1));
        let stretch = 1. + 0.5 * (label / FAMILIES) as f32;

        let mut points = Array2::zeros((self.num_points, 3));
        for mut row in points.rows_mut() {
            let [x, y, z] = surface_point(label % FAMILIES, &mut rng);
            let noise: [f32; 3] = std::array::from_fn(|_| {
                let n: f32 = StandardNormal.sample(&mut rng);
                n * NOISE
            });

            row[0] = x + noise[0];
            row[1] = y + noise[1];
            row[2] = z * stretch + noise[2];
        }

        Ok(Sample { points, label })
    }
}

/// Samples one point from the surface of the unit sized shape `family`.
fn surface_point<R: Rng>(family: usize, rng: &mut R) -> [f32; 3] {
    let u: f32 = rng.random();
    let v: f32 = rng.random();
    let theta = TAU * u;

    match family {
        // sphere
        0 => {
            let z = 2. * v - 1.;
            let r = (1. - z * z).sqrt();
            [r * theta.cos(), r * theta.sin(), z]
        }
        // cube
        1 => {
            let face = rng.random_range(0..6);
            let (a, b) = (2. * u - 1., 2. * v - 1.);
            let side = if face % 2 == 0 { 1. } else { -1. };
            match face / 2 {
                0 => [side, a, b],
                1 => [a, side, b],
                _ => [a, b, side],
            }
        }
        // cylinder
        2 => [theta.cos(), theta.sin(), 2. * v - 1.],
        // cone, apex up
        3 => {
            let r = 1. - v;
            [r * theta.cos(), r * theta.sin(), 2. * v - 1.]
        }
        // torus
        4 => {
            let phi = TAU * v;
            let (major, minor) = (0.7, 0.3);
            let ring = major + minor * phi.cos();
            [ring * theta.cos(), ring * theta.sin(), minor * phi.sin()]
        }
        // plane
        _ => [2. * u - 1., 2. * v - 1., 0.],
    }
}
