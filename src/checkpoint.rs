//! Checkpoint store
//!
//! A checkpoint is a single binary file holding the trained weights plus the
//! metadata needed to rebuild the exact topology: architecture tag, hidden
//! units, hyperparameters and the label mapping. The envelope is MessagePack
//! (rmp-serde); the weight state inside it is Burn's binary record format.
//!
//! Saving always overwrites. Loading fails loudly on a missing file, a
//! corrupt envelope, or weights whose shapes do not match the rebuilt model.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{build_network, Architecture, FlowerNet};
use crate::training::{EVAL_BATCH_SIZE, TRAIN_BATCH_SIZE};
use crate::utils::error::FlowerVisionError;

/// File name of the checkpoint inside the save directory
pub const CHECKPOINT_FILE: &str = "checkpoint.pth";

/// On-disk checkpoint record
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Label mapping: class index to class id
    pub class_from_index: BTreeMap<usize, String>,
    /// Width of the head's first hidden layer
    pub hidden_units: usize,
    /// Number of output classes the head was trained with
    pub num_classes: usize,
    /// Learning rate the run used
    pub learning_rate: f64,
    /// Training batch size
    pub batch_size: usize,
    /// Validation/test batch size
    pub testing_batch_size: usize,
    /// Backbone architecture
    pub arch: Architecture,
    /// Burn record bytes of the full model
    pub state_dict: Vec<u8>,
}

/// Serialize the model and its metadata to `path`, overwriting any existing
/// file.
pub fn save_checkpoint<B: Backend>(
    path: &Path,
    model: &FlowerNet<B>,
    class_from_index: &BTreeMap<usize, String>,
    hidden_units: usize,
    learning_rate: f64,
    arch: Architecture,
) -> Result<()> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings, Vec<u8>>::default();
    let state_dict = recorder
        .record(model.clone().into_record(), ())
        .map_err(|e| anyhow::anyhow!("Failed to serialize model weights: {:?}", e))?;

    let checkpoint = Checkpoint {
        class_from_index: class_from_index.clone(),
        hidden_units,
        num_classes: model.num_classes(),
        learning_rate,
        batch_size: TRAIN_BATCH_SIZE,
        testing_batch_size: EVAL_BATCH_SIZE,
        arch,
        state_dict,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(FlowerVisionError::Io)?;
    }

    let bytes = rmp_serde::to_vec_named(&checkpoint).map_err(|e| {
        FlowerVisionError::Checkpoint(format!("failed to encode checkpoint: {}", e))
    })?;
    std::fs::write(path, bytes).map_err(|e| {
        FlowerVisionError::Checkpoint(format!("failed to write {:?}: {}", path, e))
    })?;

    info!("Checkpoint saved to {:?}", path);
    Ok(())
}

/// Read a checkpoint and rebuild an identically shaped model with the stored
/// weights loaded into it.
///
/// The model topology is reconstructed from the stored architecture and
/// hidden-unit count; the caller's class count must match the class count
/// the checkpoint was trained with, otherwise loading the stored weights
/// would silently leave the head at its trained width. Every failure
/// propagates.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
    num_classes: usize,
) -> Result<(FlowerNet<B>, Checkpoint)> {
    let bytes = std::fs::read(path).map_err(|e| {
        FlowerVisionError::Checkpoint(format!("failed to read {:?}: {}", path, e))
    })?;

    let mut checkpoint: Checkpoint = rmp_serde::from_slice(&bytes).map_err(|e| {
        FlowerVisionError::Checkpoint(format!("corrupt checkpoint at {:?}: {}", path, e))
    })?;

    if checkpoint.num_classes != num_classes {
        return Err(FlowerVisionError::Checkpoint(format!(
            "checkpoint at {:?} was trained with {} classes, {} requested",
            path, checkpoint.num_classes, num_classes
        ))
        .into());
    }

    let model = build_network::<B>(
        checkpoint.arch,
        checkpoint.hidden_units,
        num_classes,
        None,
        device,
    );

    let recorder = BinBytesRecorder::<FullPrecisionSettings, Vec<u8>>::default();
    let record = recorder
        .load(std::mem::take(&mut checkpoint.state_dict), device)
        .map_err(|e| anyhow::anyhow!("Failed to load model weights: {:?}", e))?;
    let model = model.load_record(record);

    info!("Checkpoint loaded from {:?} ({})", path, checkpoint.arch);
    Ok((model, checkpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use burn::tensor::Tensor;

    type B = DefaultBackend;

    fn label_mapping(n: usize) -> BTreeMap<usize, String> {
        (0..n).map(|i| (i, format!("{}", i + 1))).collect()
    }

    #[test]
    fn test_checkpoint_round_trip_reproduces_outputs() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);

        let model = build_network::<B>(Architecture::Resnet, 16, 4, None, &device);

        let input = Tensor::<B, 4>::random(
            [1, 3, 32, 32],
            burn::tensor::Distribution::Default,
            &device,
        );
        let before: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();

        save_checkpoint(&path, &model, &label_mapping(4), 16, 0.001, Architecture::Resnet)
            .unwrap();

        let (restored, meta) = load_checkpoint::<B>(&path, &device, 4).unwrap();
        assert_eq!(meta.arch, Architecture::Resnet);
        assert_eq!(meta.hidden_units, 16);
        assert_eq!(meta.num_classes, 4);
        assert_eq!(meta.batch_size, TRAIN_BATCH_SIZE);
        assert_eq!(meta.class_from_index.len(), 4);

        let after: Vec<f32> = restored.forward(input).into_data().to_vec().unwrap();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-6, "outputs diverged: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);

        let model = build_network::<B>(Architecture::Resnet, 8, 2, None, &device);
        save_checkpoint(&path, &model, &label_mapping(2), 8, 0.01, Architecture::Resnet).unwrap();
        let first_len = std::fs::metadata(&path).unwrap().len();

        // Saving again over the same path must succeed.
        save_checkpoint(&path, &model, &label_mapping(2), 8, 0.01, Architecture::Resnet).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), first_len);
    }

    #[test]
    fn test_load_with_mismatched_class_count_is_an_error() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);

        let model = build_network::<B>(Architecture::Resnet, 8, 4, None, &device);
        save_checkpoint(&path, &model, &label_mapping(4), 8, 0.001, Architecture::Resnet).unwrap();

        // The stored head is 4 classes wide; asking for 102 must fail
        // instead of returning a model whose output width disagrees with
        // the requested class count.
        let err = load_checkpoint::<B>(&path, &device, 102).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowerVisionError>(),
            Some(FlowerVisionError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_load_missing_checkpoint_is_an_error() {
        let device = Default::default();
        let err = load_checkpoint::<B>(Path::new("/nonexistent/checkpoint.pth"), &device, 5)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowerVisionError>(),
            Some(FlowerVisionError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_load_corrupt_checkpoint_is_an_error() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        std::fs::write(&path, b"not a checkpoint").unwrap();

        let err = load_checkpoint::<B>(&path, &device, 5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowerVisionError>(),
            Some(FlowerVisionError::Checkpoint(_))
        ));
    }
}
