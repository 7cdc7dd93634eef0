use std::{fs, path::Path};

use ndarray::Array2;
use serde::Deserialize;

use crate::{DataErr, Partition, PointCloudDataset, Result, Sample};

#[derive(Debug, Deserialize)]
struct PartitionFile {
    num_classes: usize,
    samples: Vec<RawSample>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    label: usize,
    points: Vec<[f32; 3]>,
}

/// A partition read eagerly from `<path>/<partition>.json`:
///
/// ```json
/// {"num_classes": 40, "samples": [{"label": 3, "points": [[0.1, 0.2, 0.3], ...]}]}
/// ```
///
/// Each cloud is cut down to its first `num_points` points.
#[derive(Debug, Clone)]
pub struct Local {
    num_classes: usize,
    samples: Vec<Sample>,
}

impl Local {
    pub fn load(path: &Path, partition: Partition, num_points: usize) -> Result<Self> {
        let file = path.join(format!("{}.json", partition.name()));
        let raw = fs::read_to_string(&file).map_err(|source| DataErr::Io {
            path: file.clone(),
            source,
        })?;
        let parsed: PartitionFile =
            serde_json::from_str(&raw).map_err(|source| DataErr::Json { path: file, source })?;

        Self::from_raw(parsed, partition, num_points)
    }

    fn from_raw(raw: PartitionFile, partition: Partition, num_points: usize) -> Result<Self> {
        if raw.samples.is_empty() {
            return Err(DataErr::EmptyPartition(partition.name()));
        }

        let num_classes = raw.num_classes;
        let samples = raw
            .samples
            .into_iter()
            .enumerate()
            .map(|(index, sample)| {
                if sample.label >= num_classes {
                    return Err(DataErr::MalformedSample {
                        index,
                        reason: format!("label {} but only {num_classes} classes", sample.label),
                    });
                }
                if sample.points.len() < num_points {
                    return Err(DataErr::MalformedSample {
                        index,
                        reason: format!("{} points, {num_points} required", sample.points.len()),
                    });
                }

                let flat: Vec<f32> = sample.points[..num_points]
                    .iter()
                    .flatten()
                    .copied()
                    .collect();

                Ok(Sample {
                    points: Array2::from_shape_vec((num_points, 3), flat)?,
                    label: sample.label,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            num_classes,
            samples,
        })
    }
}

impl PointCloudDataset for Local {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        self.samples
            .get(idx)
            .cloned()
            .ok_or(DataErr::IndexOutOfRange {
                index: idx,
                len: self.samples.len(),
            })
    }
}
