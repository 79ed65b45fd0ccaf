//! Burn dataset and batcher integration
//!
//! Items are preprocessed CHW float buffers loaded lazily from disk; the
//! batcher stacks them into a `[batch, 3, 224, 224]` tensor and applies
//! ImageNet normalization as broadcast tensors on the device. The flip
//! augmentation is derived from the run seed, so augmented runs are
//! reproducible.

use std::path::PathBuf;

use anyhow::Context;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::transform::{
    center_crop, resize_shorter_side, to_chw_unit, CROP_SIZE, IMAGENET_MEAN, IMAGENET_STD,
    RESIZE_SIZE,
};

/// A single preprocessed image ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageItem {
    /// Flattened CHW float buffer, `3 * 224 * 224`, scaled to `[0, 1]`
    pub image: Vec<f32>,
    /// Class label index
    pub label: usize,
    /// Source path, kept for logging
    pub path: String,
}

impl ImageItem {
    /// Load an image from disk and run the preprocessing pipeline, flipping
    /// horizontally first when `flip` is set.
    pub fn from_path(path: &PathBuf, label: usize, flip: bool) -> anyhow::Result<Self> {
        let img = image::open(path).with_context(|| format!("Failed to decode image {:?}", path))?;

        let img = if flip { img.fliph() } else { img };

        let img = resize_shorter_side(&img, RESIZE_SIZE);
        let img = center_crop(&img, CROP_SIZE);

        Ok(Self {
            image: to_chw_unit(&img),
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

/// Lazily loading dataset over a list of (path, label) samples
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Vec<(PathBuf, usize)>,
    augment: bool,
    seed: u64,
}

impl ImageDataset {
    /// Create a dataset without augmentation (validation/test).
    pub fn new(samples: Vec<(PathBuf, usize)>) -> Self {
        Self {
            samples,
            augment: false,
            seed: 0,
        }
    }

    /// Create a training dataset with optional flip augmentation driven by
    /// the run seed.
    pub fn with_augmentation(samples: Vec<(PathBuf, usize)>, augment: bool, seed: u64) -> Self {
        Self {
            samples,
            augment,
            seed,
        }
    }

    /// Whether the flip fires for the sample at `index`, derived from the
    /// run seed so the same run always augments the same way.
    fn flip_at(&self, index: usize) -> bool {
        if !self.augment {
            return false;
        }

        let stream = self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        ChaCha8Rng::seed_from_u64(stream).gen_bool(0.5)
    }

    /// Load the sample at `index`, propagating decode failures with the
    /// offending path attached.
    pub fn try_get(&self, index: usize) -> anyhow::Result<ImageItem> {
        let (path, label) = self
            .samples
            .get(index)
            .with_context(|| format!("Sample index {} out of range", index))?;

        ImageItem::from_path(path, *label, self.flip_at(index))
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(e) => {
                error!("Dropping sample {}: {:#}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and their labels
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images with shape `[batch, 3, height, width]`, ImageNet-normalized
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking items into normalized tensors
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    pub fn new() -> Self {
        Self {
            image_size: CROP_SIZE as usize,
        }
    }
}

impl Default for ImageBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );

        // ImageNet normalization as broadcast over [1, 3, 1, 1]
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type B = DefaultBackend;

    fn dummy_item(label: usize, size: usize) -> ImageItem {
        ImageItem {
            image: vec![0.5f32; 3 * size * size],
            label,
            path: String::new(),
        }
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batcher = ImageBatcher { image_size: 8 };

        let items = vec![dummy_item(0, 8), dummy_item(2, 8), dummy_item(1, 8)];
        let batch: ImageBatch<B> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn test_batcher_applies_imagenet_normalization() {
        let device = Default::default();
        let batcher = ImageBatcher { image_size: 2 };

        let batch: ImageBatch<B> = batcher.batch(vec![dummy_item(0, 2)], &device);
        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();

        // First channel: (0.5 - mean[0]) / std[0]
        let expected = (0.5 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((values[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_default_batcher_uses_crop_size() {
        let device = Default::default();

        let batch: ImageBatch<B> =
            ImageBatcher::default().batch(vec![dummy_item(0, CROP_SIZE as usize)], &device);
        assert_eq!(
            batch.images.dims(),
            [1, 3, CROP_SIZE as usize, CROP_SIZE as usize]
        );
    }

    #[test]
    fn test_try_get_corrupt_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let dataset = ImageDataset::new(vec![(path.clone(), 0)]);
        let err = dataset.try_get(0).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.jpg"));
    }

    #[test]
    fn test_seeded_augmentation_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        // Asymmetric image so a flip changes the buffer.
        let pixels = [0u8, 0, 0, 255, 255, 255];
        image::save_buffer(&path, &pixels, 2, 1, image::ExtendedColorType::Rgb8).unwrap();

        let samples: Vec<(PathBuf, usize)> = (0..6).map(|_| (path.clone(), 0)).collect();
        let first = ImageDataset::with_augmentation(samples.clone(), true, 7);
        let second = ImageDataset::with_augmentation(samples, true, 7);

        for i in 0..6 {
            let a = first.try_get(i).unwrap();
            let b = second.try_get(i).unwrap();
            assert_eq!(a.image, b.image, "sample {} diverged between runs", i);
        }
    }
}
