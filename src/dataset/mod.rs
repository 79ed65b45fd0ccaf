//! Dataset handling
//!
//! - `loader`: image-folder discovery and the train/valid/test splits
//! - `transform`: the resize/crop/normalize preprocessing pipeline
//! - `batch`: Burn `Dataset` and `Batcher` integration

pub mod batch;
pub mod loader;
pub mod transform;

pub use batch::{ImageBatch, ImageBatcher, ImageDataset, ImageItem};
pub use loader::{FlowerSplits, ImageFolder, ImageSample};
pub use transform::{CROP_SIZE, IMAGENET_MEAN, IMAGENET_STD, RESIZE_SIZE};
