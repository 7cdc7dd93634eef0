use std::{
    sync::{
        Arc,
        mpsc::{self, Receiver},
    },
    thread::{self, JoinHandle},
};

use log::debug;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use crate::{Batch, DataErr, PointCloudDataset, Result, augment::augment, sample::mix};

const SHUFFLE_STREAM: u64 = 0x5348_5546;
const AUGMENT_STREAM: u64 = 0x4155_474d;

/// How a `DataLoader` walks its dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub drop_last: bool,
    pub augment: bool,
    /// The amount of threads materializing samples.
    pub workers: usize,
    /// The amount of whole batches prepared ahead of the consumer.
    pub prefetch: usize,
    pub seed: u64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            augment: false,
            workers: 8,
            prefetch: 2,
            seed: 0,
        }
    }
}

/// Splits a dataset into batches, one epoch per call to `iter`.
///
/// Samples of a batch are materialized in parallel on a bounded pool, and whole batches are
/// prefetched by a background producer. Batches are always delivered in order, and the order
/// only depends on the seed and the epoch.
pub struct DataLoader {
    dataset: Arc<dyn PointCloudDataset>,
    options: LoaderOptions,
    pool: Arc<ThreadPool>,
    epoch: u64,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Errors
    /// `InvalidOption` for a zero batch size or worker count, `Pool` if the threads can't be
    /// spawned.
    pub fn new(dataset: Arc<dyn PointCloudDataset>, options: LoaderOptions) -> Result<Self> {
        for (name, value) in [("batch_size", options.batch_size), ("workers", options.workers)] {
            if value == 0 {
                return Err(DataErr::InvalidOption {
                    name,
                    reason: "must be positive".into(),
                });
            }
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .thread_name(|i| format!("loader-{i}"))
            .build()?;

        Ok(Self {
            dataset,
            options,
            pool: Arc::new(pool),
            epoch: 0,
        })
    }

    pub fn dataset(&self) -> &Arc<dyn PointCloudDataset> {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Returns the amount of batches of one epoch.
    pub fn len(&self) -> usize {
        let (samples, size) = (self.dataset.len(), self.options.batch_size);
        if self.options.drop_last {
            samples / size
        } else {
            samples.div_ceil(size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new epoch.
    ///
    /// # Returns
    /// An iterator over the epoch's batches. Dropping it early stops the producer.
    pub fn iter(&mut self) -> Batches {
        let epoch = self.epoch;
        self.epoch += 1;

        let LoaderOptions {
            batch_size,
            shuffle,
            drop_last,
            augment: augmenting,
            prefetch,
            seed,
            ..
        } = self.options;

        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(mix(seed, SHUFFLE_STREAM, epoch)));
        }

        let mut batches: Vec<Vec<usize>> = order.chunks(batch_size).map(<[usize]>::to_vec).collect();
        if drop_last && batches.last().is_some_and(|b| b.len() < batch_size) {
            batches.pop();
        }

        debug!(
            "starting epoch: epoch={epoch} batches={} batch_size={batch_size}",
            batches.len()
        );

        let (tx, rx) = mpsc::sync_channel(prefetch.max(1));
        let dataset = Arc::clone(&self.dataset);
        let pool = Arc::clone(&self.pool);
        let augment_seed = mix(seed, AUGMENT_STREAM, epoch);

        let producer = thread::spawn(move || {
            for indices in batches {
                let batch = pool.install(|| {
                    indices
                        .par_iter()
                        .map(|&idx| {
                            let mut sample = dataset.get(idx)?;
                            if augmenting {
                                let mut rng = StdRng::seed_from_u64(mix(augment_seed, idx as u64, 0));
                                augment(&mut sample, &mut rng);
                            }
                            Ok(sample)
                        })
                        .collect::<Result<Vec<_>>>()
                });

                let failed = batch.is_err();
                if tx.send(batch.and_then(Batch::stack)).is_err() || failed {
                    // Either the consumer is gone or it has been handed the error.
                    break;
                }
            }
        });

        Batches {
            rx: Some(rx),
            producer: Some(producer),
        }
    }
}

/// The batches of one epoch, in order.
pub struct Batches {
    rx: Option<Receiver<Result<Batch>>>,
    producer: Option<JoinHandle<()>>,
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let rx = self.rx.as_ref()?;

        match rx.recv() {
            Ok(batch) => Some(batch),
            Err(_) => {
                self.rx = None;
                let producer = self.producer.take()?;
                producer.join().err().map(|_| Err(DataErr::ProducerPanicked))
            }
        }
    }
}

impl Drop for Batches {
    fn drop(&mut self) {
        self.rx.take();
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Partition, Sample, synthetic::Synthetic};

    fn loader(samples: usize, options: LoaderOptions) -> DataLoader {
        let dataset = Synthetic::new(3, samples, 8, Partition::Train, 5).unwrap();
        DataLoader::new(Arc::new(dataset), options).unwrap()
    }

    fn labels(batches: Batches) -> Vec<Vec<usize>> {
        batches.map(|b| b.unwrap().labels).collect()
    }

    #[test]
    fn keeps_the_last_partial_batch() {
        let mut dl = loader(
            10,
            LoaderOptions {
                batch_size: 4,
                workers: 2,
                ..Default::default()
            },
        );

        assert_eq!(dl.len(), 3);
        let sizes: Vec<usize> = labels(dl.iter()).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn drops_the_last_partial_batch() {
        let mut dl = loader(
            10,
            LoaderOptions {
                batch_size: 4,
                drop_last: true,
                shuffle: true,
                workers: 2,
                ..Default::default()
            },
        );

        assert_eq!(dl.len(), 2);
        let batches: Vec<Batch> = dl.iter().map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.points.dim() == (4, 8, 3)));
    }

    #[test]
    fn unshuffled_batches_follow_dataset_order() {
        let mut dl = loader(
            6,
            LoaderOptions {
                batch_size: 4,
                workers: 3,
                ..Default::default()
            },
        );

        assert_eq!(labels(dl.iter()), vec![vec![0, 1, 2, 0], vec![1, 2]]);
    }

    #[test]
    fn shuffling_is_seeded_per_epoch() {
        let options = LoaderOptions {
            batch_size: 5,
            shuffle: true,
            augment: true,
            workers: 2,
            seed: 17,
            ..Default::default()
        };
        let mut a = loader(20, options);
        let mut b = loader(20, options);

        let a_first: Vec<Batch> = a.iter().map(|b| b.unwrap()).collect();
        let b_first: Vec<Batch> = b.iter().map(|b| b.unwrap()).collect();
        assert_eq!(a_first, b_first);

        let a_second: Vec<Batch> = a.iter().map(|b| b.unwrap()).collect();
        assert_ne!(a_first, a_second);
    }

    #[test]
    fn dropping_the_iterator_stops_the_producer() {
        let mut dl = loader(
            64,
            LoaderOptions {
                batch_size: 2,
                prefetch: 1,
                workers: 1,
                ..Default::default()
            },
        );

        let mut batches = dl.iter();
        assert!(batches.next().is_some());
        drop(batches);

        // The loader is still usable for the next epoch.
        assert_eq!(dl.iter().count(), 32);
    }

    struct Failing;

    impl PointCloudDataset for Failing {
        fn len(&self) -> usize {
            4
        }

        fn num_classes(&self) -> usize {
            2
        }

        fn get(&self, idx: usize) -> Result<Sample> {
            Err(DataErr::MalformedSample {
                index: idx,
                reason: "unreadable".into(),
            })
        }
    }

    #[test]
    fn sample_errors_reach_the_consumer() {
        let mut dl = DataLoader::new(
            Arc::new(Failing),
            LoaderOptions {
                batch_size: 2,
                workers: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let results: Vec<Result<Batch>> = dl.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(DataErr::MalformedSample { .. })));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dataset = Synthetic::new(2, 4, 8, Partition::Test, 0).unwrap();
        let options = LoaderOptions {
            batch_size: 0,
            ..Default::default()
        };

        assert!(DataLoader::new(Arc::new(dataset), options).is_err());
    }
}
