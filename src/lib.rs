//! # flowervision
//!
//! Transfer learning for flower image classification with the Burn
//! framework: take a pretrained convolutional backbone, attach a fresh
//! classifier head, fine-tune it on an image-folder dataset, checkpoint it,
//! and predict top-K categories for new images.
//!
//! ## Modules
//!
//! - `model`: architecture catalog, backbone, classifier head
//! - `dataset`: image-folder loading, transforms, Burn batching
//! - `training`: the fine-tuning and validation loops
//! - `checkpoint`: single-file weight + metadata persistence
//! - `inference`: image preprocessing and top-K prediction
//! - `backend`: compute backend and device selection

pub mod backend;
pub mod checkpoint;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use backend::{DefaultBackend, TrainingBackend};
pub use checkpoint::{load_checkpoint, save_checkpoint, Checkpoint, CHECKPOINT_FILE};
pub use dataset::{FlowerSplits, ImageBatch, ImageBatcher, ImageDataset, ImageItem};
pub use inference::{predict, print_predictions, process_image, TopPrediction};
pub use model::{build_network, Architecture, ClassifierHead, FlowerNet, LossKind};
pub use training::{run_finetune, EVAL_BATCH_SIZE, PRINT_EVERY, TRAIN_BATCH_SIZE};
pub use utils::error::FlowerVisionError;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
