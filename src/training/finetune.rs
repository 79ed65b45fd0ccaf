//! Fine-tuning run
//!
//! Wires the dataset splits, the model builder and the training loop into a
//! single entry point used by the `train` subcommand.

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::checkpoint::{save_checkpoint, CHECKPOINT_FILE};
use crate::dataset::{FlowerSplits, ImageBatcher, ImageDataset};
use crate::model::{apply_freeze_policy, build_network, Architecture};
use crate::training::{
    num_batches, validate, LossMeter, EVAL_BATCH_SIZE, PRINT_EVERY, TRAIN_BATCH_SIZE,
};

/// Hyperparameters for one fine-tuning run, fixed for its duration.
#[derive(Debug, Clone)]
pub struct FinetuneConfig {
    pub arch: Architecture,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub epochs: usize,
    pub num_classes: usize,
    /// Directory holding pretrained backbone record files
    pub pretrained_dir: Option<PathBuf>,
    /// Random horizontal flip on the training split
    pub augment: bool,
    pub seed: u64,
}

/// Fine-tune a pretrained network on an image-folder dataset and write the
/// checkpoint to `<save_dir>/checkpoint.pth`.
pub fn run_finetune<B: AutodiffBackend>(
    data_dir: &str,
    save_dir: &str,
    config: &FinetuneConfig,
    device: B::Device,
) -> Result<()> {
    println!("{}", "Initializing training...".green().bold());
    println!("  Device: {:?}", device);

    let splits = FlowerSplits::open(data_dir)?;
    splits.print_stats();

    if splits.train.num_classes() != config.num_classes {
        warn!(
            "Dataset has {} classes but the classifier is sized for {}",
            splits.train.num_classes(),
            config.num_classes
        );
    }

    let class_from_index = splits.class_from_index();

    let train_samples: Vec<(PathBuf, usize)> = splits
        .train
        .samples
        .iter()
        .map(|s| (s.path.clone(), s.label))
        .collect();
    let valid_samples: Vec<(PathBuf, usize)> = splits
        .valid
        .samples
        .iter()
        .map(|s| (s.path.clone(), s.label))
        .collect();

    let train_dataset = ImageDataset::with_augmentation(train_samples, config.augment, config.seed);
    let valid_dataset = ImageDataset::new(valid_samples);

    let batcher = ImageBatcher::new();
    // AutodiffBackend shares its device type with the inner backend, so
    // validation runs on the device selected for training.
    let inner_device = device.clone();

    println!();
    println!("{}", "Building model...".cyan());
    let model = build_network::<B>(
        config.arch,
        config.hidden_units,
        config.num_classes,
        config.pretrained_dir.as_deref(),
        &device,
    );
    let mut model = apply_freeze_policy(model, config.arch);

    // Adam over the classifier head only; the backbone is never optimized.
    let mut optimizer = AdamConfig::new().init();
    let criterion = config.arch.spec().loss;

    println!();
    println!("{}", "Training configuration:".cyan().bold());
    println!("  Architecture:  {}", config.arch);
    println!("  Epochs:        {}", config.epochs);
    println!("  Batch size:    {}", TRAIN_BATCH_SIZE);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Hidden units:  {}", config.hidden_units);
    println!();
    println!("{}", "Starting training...".green().bold());

    let valid_batches = num_batches(&valid_dataset, EVAL_BATCH_SIZE).max(1) as f64;
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut step = 0usize;
    let mut train_loss = LossMeter::default();

    for epoch in 0..config.epochs {
        let mut epoch_loss = 0.0f64;
        train_loss.reset();

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);
        let batches_this_epoch = indices.len().div_ceil(TRAIN_BATCH_SIZE);

        for batch_idx in 0..batches_this_epoch {
            step += 1;

            let start = batch_idx * TRAIN_BATCH_SIZE;
            let end = (start + TRAIN_BATCH_SIZE).min(indices.len());
            let items = indices[start..end]
                .iter()
                .map(|&i| train_dataset.try_get(i))
                .collect::<Result<Vec<_>>>()?;

            let batch = batcher.batch(items, &device);

            let output = model.forward(batch.images);
            let loss = criterion.forward(output, batch.targets);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            train_loss.record(loss_value);
            epoch_loss += loss_value;

            let grads = loss.backward();
            // Restrict the update to the head's parameters.
            let grads = GradientsParams::from_grads(grads, &model.head);
            model = optimizer.step(config.learning_rate, model, grads);

            if step % PRINT_EVERY == 0 {
                let valid_model = model.valid();
                let (val_loss, val_accuracy) = validate(
                    &valid_model,
                    &valid_dataset,
                    &batcher,
                    &inner_device,
                    EVAL_BATCH_SIZE,
                    criterion,
                )?;

                println!(
                    "Epoch: {}/{}  Loss: {:.3}  Val Loss: {:.3}  Val Accuracy: {:.3}",
                    epoch + 1,
                    config.epochs,
                    train_loss.average(),
                    val_loss / valid_batches,
                    val_accuracy / valid_batches,
                );

                train_loss.reset();
            }
        }

        info!(
            "Epoch {} finished, average training loss {:.4}",
            epoch + 1,
            epoch_loss / batches_this_epoch.max(1) as f64
        );
    }

    println!();
    println!("{}", "Training finished".green().bold());

    let checkpoint_path = Path::new(save_dir).join(CHECKPOINT_FILE);
    save_checkpoint(
        &checkpoint_path,
        &model,
        &class_from_index,
        config.hidden_units,
        config.learning_rate,
        config.arch,
    )?;
    println!("  Checkpoint saved to {:?}", checkpoint_path);

    Ok(())
}
