use super::{CellBatch, RandomAccessDataset};
use crate::{augment::RandomFlipRotate, common::*};

#[derive(Debug, Clone)]
pub struct DataLoaderInit {
    pub batch_size: usize,
    pub num_workers: usize,
    /// Shuffle the sample order every epoch.
    pub shuffle: bool,
    /// Random flips and rotations applied to each crop.
    pub augmentation: Option<RandomFlipRotate>,
}

impl DataLoaderInit {
    pub fn build(self, dataset: Arc<dyn RandomAccessDataset>) -> Result<DataLoader> {
        let Self {
            batch_size,
            num_workers,
            shuffle,
            augmentation,
        } = self;

        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(num_workers > 0, "num_workers must be positive");

        Ok(DataLoader {
            dataset,
            batch_size,
            num_workers,
            shuffle,
            augmentation,
        })
    }
}

/// Assembles batches of cell crops on worker threads.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Arc<dyn RandomAccessDataset>,
    batch_size: usize,
    num_workers: usize,
    shuffle: bool,
    augmentation: Option<RandomFlipRotate>,
}

impl DataLoader {
    pub fn dataset(&self) -> &Arc<dyn RandomAccessDataset> {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_samples(&self) -> usize {
        self.dataset.num_samples()
    }

    /// The number of batches per epoch. The last batch may be partial.
    pub fn num_batches(&self) -> usize {
        (self.num_samples() + self.batch_size - 1) / self.batch_size
    }

    /// Starts loading the batches of an epoch on the runtime.
    ///
    /// Batches arrive in order through a bounded channel. The sample order and
    /// augmentations are determined by the seed. Loading stops after the first
    /// error or once the receiver is dropped.
    pub fn epoch(
        &self,
        handle: &tokio::runtime::Handle,
        seed: u64,
    ) -> flume::Receiver<Result<CellBatch>> {
        let mut indexes: Vec<usize> = (0..self.num_samples()).collect();
        if self.shuffle {
            indexes.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        let chunks: Vec<Vec<usize>> = indexes
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let (tx, rx) = flume::bounded(self.num_workers * 2);
        let dataset = self.dataset.clone();
        let augmentation = self.augmentation.clone();
        let num_workers = self.num_workers;

        handle.spawn(async move {
            let mut stream = Box::pin(stream::iter(chunks.into_iter().enumerate()).par_map(
                num_workers,
                move |(batch_index, indexes)| {
                    let dataset = dataset.clone();
                    let augmentation = augmentation.clone();

                    move || {
                        let batch_seed = seed ^ (batch_index as u64).rotate_left(32);
                        let mut rng = StdRng::seed_from_u64(batch_seed);
                        load_batch(&*dataset, &indexes, augmentation.as_ref(), &mut rng)
                    }
                },
            ));

            while let Some(result) = stream.next().await {
                let is_err = result.is_err();
                if tx.send_async(result).await.is_err() || is_err {
                    break;
                }
            }
        });

        rx
    }
}

fn load_batch(
    dataset: &dyn RandomAccessDataset,
    indexes: &[usize],
    augmentation: Option<&RandomFlipRotate>,
    rng: &mut StdRng,
) -> Result<CellBatch> {
    let mut keys = Vec::with_capacity(indexes.len());
    let mut images = Vec::with_capacity(indexes.len());
    let mut labels = Vec::with_capacity(indexes.len());

    for &index in indexes {
        let (key, image, label) = dataset.nth(index)?;
        let image = match augmentation {
            Some(augmentation) => augmentation.apply(&image, rng),
            None => image,
        };
        keys.push(key);
        images.push(image);
        labels.push(label);
    }

    Ok(CellBatch {
        images: Tensor::stack(&images, 0),
        labels: Tensor::stack(&labels, 0),
        keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellKey, GenericDataset};

    #[derive(Debug)]
    struct SyntheticDataset {
        len: usize,
    }

    impl GenericDataset for SyntheticDataset {
        fn input_channels(&self) -> usize {
            2
        }

        fn num_classes(&self) -> usize {
            3
        }
    }

    impl RandomAccessDataset for SyntheticDataset {
        fn num_samples(&self) -> usize {
            self.len
        }

        fn nth(&self, index: usize) -> Result<(CellKey, Tensor, Tensor)> {
            let key = CellKey {
                image_id: format!("img{}", index),
                cell_index: index,
            };
            let image = Tensor::full(&[2, 4, 4], index as f64, (Kind::Float, Device::Cpu));
            let label = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
            Ok((key, image, label))
        }
    }

    fn keys(loader: &DataLoader, seed: u64) -> Result<Vec<usize>> {
        let runtime = tokio::runtime::Runtime::new()?;
        let rx = loader.epoch(runtime.handle(), seed);
        let mut keys = vec![];
        for batch in rx.iter() {
            let batch = batch?;
            assert_eq!(&batch.images.size()[1..], &[2, 4, 4]);
            keys.extend(batch.keys.iter().map(|key| key.cell_index));
        }
        Ok(keys)
    }

    #[test]
    fn sequential_loader_keeps_order() -> Result<()> {
        let loader = DataLoaderInit {
            batch_size: 3,
            num_workers: 2,
            shuffle: false,
            augmentation: None,
        }
        .build(Arc::new(SyntheticDataset { len: 10 }))?;

        assert_eq!(loader.num_batches(), 4);
        assert_eq!(keys(&loader, 0)?, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn shuffled_loader_is_seeded() -> Result<()> {
        let loader = DataLoaderInit {
            batch_size: 4,
            num_workers: 3,
            shuffle: true,
            augmentation: Some(RandomFlipRotate::default()),
        }
        .build(Arc::new(SyntheticDataset { len: 10 }))?;

        let first = keys(&loader, 5)?;
        let second = keys(&loader, 5)?;
        assert_eq!(first, second);
        assert_eq!(
            first.iter().copied().sorted().collect::<Vec<_>>(),
            (0..10).collect::<Vec<_>>()
        );
        Ok(())
    }
}
