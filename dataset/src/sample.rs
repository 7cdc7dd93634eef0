use std::fmt;

use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::{DataErr, Result};

/// The subsets a dataset is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Train,
    Validation,
    Test,
}

impl Partition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }

    /// A distinct number per partition, used to derive independent random streams.
    pub(crate) fn stream(&self) -> u64 {
        match self {
            Self::Train => 1,
            Self::Validation => 2,
            Self::Test => 3,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single labelled point cloud, `points` holds one `(x, y, z)` row per point.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub points: Array2<f32>,
    pub label: usize,
}

/// A batch of clouds with the same amount of points, `(clouds × points × 3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub points: Array3<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    /// Stacks samples into a batch.
    ///
    /// # Errors
    /// `EmptyPartition` for no samples, `Shape` when the clouds' sizes differ.
    pub fn stack(samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(DataErr::EmptyPartition("batch"));
        }

        let views: Vec<ArrayView2<f32>> = samples.iter().map(|s| s.points.view()).collect();
        let points = ndarray::stack(Axis(0), &views)?;
        let labels = samples.iter().map(|s| s.label).collect();

        Ok(Self { points, labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Derives a well mixed 64 bit seed from a base seed and two stream coordinates.
pub(crate) fn mix(seed: u64, a: u64, b: u64) -> u64 {
    let mut z = seed
        .wrapping_add(a.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(b.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn stacking_keeps_sample_order() {
        let a = Sample {
            points: array![[0., 0., 0.], [1., 1., 1.]],
            label: 3,
        };
        let b = Sample {
            points: array![[2., 2., 2.], [3., 3., 3.]],
            label: 1,
        };

        let batch = Batch::stack(vec![a, b]).unwrap();
        assert_eq!(batch.points.dim(), (2, 2, 3));
        assert_eq!(batch.labels, vec![3, 1]);
        assert_eq!(batch.points[[1, 0, 0]], 2.);
    }

    #[test]
    fn stacking_rejects_uneven_clouds() {
        let a = Sample {
            points: Array2::zeros((2, 3)),
            label: 0,
        };
        let b = Sample {
            points: Array2::zeros((3, 3)),
            label: 0,
        };

        assert!(matches!(Batch::stack(vec![a, b]), Err(DataErr::Shape(_))));
        assert!(Batch::stack(Vec::new()).is_err());
    }

    #[test]
    fn mixed_streams_differ() {
        assert_ne!(mix(42, 1, 0), mix(42, 2, 0));
        assert_ne!(mix(42, 1, 0), mix(42, 1, 1));
        assert_eq!(mix(7, 3, 9), mix(7, 3, 9));
    }
}
