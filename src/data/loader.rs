//! DataLoader for batching and iterating over SVHN images
//!
//! Provides batching for GAN training with support for:
//! - Random shuffling (reshuffled every epoch)
//! - Keeping or dropping the last incomplete batch
//! - Iteration over batches

use anyhow::Result;
use ndarray::{Array4, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{Device, Tensor};

use super::preprocessing::bytes_to_unit;
use super::svhn::{SvhnDataset, CHANNELS, IMAGE_SIZE};

/// One mini-batch of real images
#[derive(Debug, Clone)]
pub struct Batch {
    /// Images of shape (batch, 3, 32, 32) with values in [0, 1]
    pub images: Array4<f32>,
    /// Digit labels, one per image
    pub labels: Vec<u8>,
}

impl Batch {
    /// Number of images in the batch
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copy the images into a float tensor on `device`
    pub fn to_tensor(&self, device: Device) -> Result<Tensor> {
        let dims: Vec<i64> = self.images.shape().iter().map(|&d| d as i64).collect();
        let values: Vec<f32> = self.images.iter().copied().collect();

        Ok(Tensor::from_slice(&values).f_view(dims.as_slice())?.to_device(device))
    }
}

/// DataLoader for iterating over batched images
pub struct DataLoader {
    dataset: SvhnDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    indices: Vec<usize>,
    current_idx: usize,
    rng: StdRng,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `dataset` - Images to iterate over
    /// * `batch_size` - Number of images per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop the incomplete final batch
    /// * `seed` - Seed for the shuffling RNG; `None` seeds from entropy
    pub fn new(
        dataset: SvhnDataset,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
        seed: Option<u64>,
    ) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut loader = Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            drop_last,
            indices,
            current_idx: 0,
            rng,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        loader
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.num_samples();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            num_samples.div_ceil(self.batch_size)
        }
    }

    /// Get total number of images
    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn dataset(&self) -> &SvhnDataset {
        &self.dataset
    }

    fn shuffle_indices(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Reset for a new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch
    ///
    /// Returns None when the epoch is complete
    pub fn next_batch(&mut self) -> Option<Batch> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return None;
        }

        let end = (start + self.batch_size).min(num_samples);
        let actual_batch_size = end - start;

        if self.drop_last && actual_batch_size < self.batch_size {
            return None;
        }

        let mut images = Array4::<f32>::zeros((actual_batch_size, CHANNELS, IMAGE_SIZE, IMAGE_SIZE));
        let mut labels = Vec::with_capacity(actual_batch_size);

        for (mut slot, &data_idx) in images.axis_iter_mut(Axis(0)).zip(&self.indices[start..end]) {
            for (dst, src) in slot.iter_mut().zip(bytes_to_unit(self.dataset.image(data_idx))) {
                *dst = src;
            }
            labels.push(self.dataset.label(data_idx));
        }

        self.current_idx = end;
        Some(Batch { images, labels })
    }

    /// Iterate over all batches of one epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::svhn::IMAGE_BYTES;

    fn dataset(count: usize) -> SvhnDataset {
        let images = (0..count)
            .flat_map(|i| std::iter::repeat(i as u8).take(IMAGE_BYTES))
            .collect();
        let labels = (0..count).map(|i| (i % 10) as u8).collect();
        SvhnDataset::from_raw(images, labels).unwrap()
    }

    #[test]
    fn test_dataloader_keeps_last_partial_batch() {
        let mut loader = DataLoader::new(dataset(10), 3, false, false, None);

        assert_eq!(loader.num_batches(), 4);
        assert_eq!(loader.num_samples(), 10);

        let sizes: Vec<usize> = loader.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let mut loader = DataLoader::new(dataset(10), 3, false, true, None);

        assert_eq!(loader.num_batches(), 3);
        assert!(loader.iter().all(|b| b.len() == 3));
        assert_eq!(loader.iter().count(), 3);
    }

    #[test]
    fn test_batch_values_in_unit_range() {
        let mut loader = DataLoader::new(dataset(4), 4, false, false, None);
        let batch = loader.next_batch().unwrap();

        assert_eq!(batch.images.shape(), &[4, 3, 32, 32]);
        assert_eq!(batch.images[[0, 0, 0, 0]], 0.0);
        assert!((batch.images[[3, 2, 31, 31]] - 3.0 / 255.0).abs() < 1e-6);
        assert_eq!(batch.labels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut loader = DataLoader::new(dataset(20), 20, true, false, Some(42));
        let mut labels = loader.next_batch().unwrap().labels;
        labels.sort_unstable();

        let mut expected: Vec<u8> = (0..20).map(|i| (i % 10) as u8).collect();
        expected.sort_unstable();
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let mut a = DataLoader::new(dataset(16), 16, true, false, Some(1));
        let mut b = DataLoader::new(dataset(16), 16, true, false, Some(1));

        assert_eq!(a.next_batch().unwrap().images, b.next_batch().unwrap().images);
    }

    #[test]
    fn test_batch_to_tensor_shape() {
        let mut loader = DataLoader::new(dataset(5), 2, false, false, None);
        let batch = loader.next_batch().unwrap();
        let tensor = batch.to_tensor(Device::Cpu).unwrap();

        assert_eq!(tensor.size(), vec![2, 3, 32, 32]);
    }
}
