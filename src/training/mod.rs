//! Training
//!
//! A plain sequential fine-tuning loop built directly on Burn's optimizer
//! API: forward, loss, backward, step, with a validation pass every few
//! batches. No early stopping and no checkpoint-on-improve; the model left
//! in memory after the last epoch is what gets persisted.

pub mod finetune;

use anyhow::Result;
use burn::data::dataset::Dataset;
use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

use crate::dataset::{ImageBatcher, ImageDataset, ImageItem};
use crate::model::{FlowerNet, LossKind};

use burn::data::dataloader::batcher::Batcher;

pub use finetune::{run_finetune, FinetuneConfig};

/// Validation runs every this many training steps
pub const PRINT_EVERY: usize = 5;

/// Training batch size
pub const TRAIN_BATCH_SIZE: usize = 64;

/// Validation/test batch size
pub const EVAL_BATCH_SIZE: usize = 32;

/// Running average of the training loss between reports
#[derive(Debug, Default)]
pub struct LossMeter {
    sum: f64,
    steps: usize,
}

impl LossMeter {
    /// Record one step's loss.
    pub fn record(&mut self, loss: f64) {
        self.sum += loss;
        self.steps += 1;
    }

    /// Mean loss over the recorded steps, 0 when nothing was recorded.
    pub fn average(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.sum / self.steps as f64
        }
    }

    /// Clear the accumulator, at epoch start and after each report.
    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.steps = 0;
    }
}

/// Fraction of predictions whose argmax matches the label, for one batch.
pub fn batch_accuracy<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let total = targets.dims()[0];
    if total == 0 {
        return 0.0;
    }

    let predictions = output.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();

    correct as f64 / total as f64
}

/// Run the model over a validation split.
///
/// Returns the loss and accuracy **summed over batches**; the caller divides
/// by the batch count. Batch accuracy is the mean fraction of argmax
/// predictions matching the labels. An unreadable image aborts the pass with
/// an error.
pub fn validate<B: Backend>(
    model: &FlowerNet<B>,
    dataset: &ImageDataset,
    batcher: &ImageBatcher,
    device: &B::Device,
    batch_size: usize,
    loss: LossKind,
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0;
    let mut accuracy_sum = 0.0;

    let len = dataset.len();
    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<ImageItem> = (start..end)
            .map(|i| dataset.try_get(i))
            .collect::<Result<_>>()?;

        let batch = batcher.batch(items, device);
        let output = model.forward(batch.images);

        let batch_loss: f64 = loss
            .forward(output.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        loss_sum += batch_loss;
        accuracy_sum += batch_accuracy(output, batch.targets);
    }

    Ok((loss_sum, accuracy_sum))
}

/// Number of batches a dataset yields at the given batch size
pub fn num_batches(dataset: &ImageDataset, batch_size: usize) -> usize {
    dataset.len().div_ceil(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::model::{build_network, Architecture};
    use burn::tensor::TensorData;

    type B = DefaultBackend;

    fn log_probs(rows: Vec<[f32; 3]>) -> Tensor<B, 2> {
        let n = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Tensor::from_floats(TensorData::new(flat, [n, 3]), &Default::default())
    }

    fn targets(labels: Vec<i64>) -> Tensor<B, 1, Int> {
        let n = labels.len();
        Tensor::from_data(TensorData::new(labels, [n]), &Default::default())
    }

    #[test]
    fn test_batch_accuracy_all_correct_is_one() {
        let output = log_probs(vec![
            [-0.1, -5.0, -5.0],
            [-5.0, -0.1, -5.0],
            [-5.0, -5.0, -0.1],
        ]);
        let accuracy = batch_accuracy(output, targets(vec![0, 1, 2]));
        assert_eq!(accuracy, 1.0);
    }

    #[test]
    fn test_batch_accuracy_all_wrong_is_zero() {
        let output = log_probs(vec![
            [-0.1, -5.0, -5.0],
            [-0.1, -5.0, -5.0],
            [-0.1, -5.0, -5.0],
        ]);
        let accuracy = batch_accuracy(output, targets(vec![1, 2, 1]));
        assert_eq!(accuracy, 0.0);
    }

    #[test]
    fn test_batch_accuracy_partial() {
        let output = log_probs(vec![[-0.1, -5.0, -5.0], [-0.1, -5.0, -5.0]]);
        let accuracy = batch_accuracy(output, targets(vec![0, 1]));
        assert!((accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_num_batches_rounds_up() {
        let dataset = ImageDataset::new(
            (0..10)
                .map(|i| (std::path::PathBuf::from(format!("{}.jpg", i)), 0))
                .collect(),
        );
        assert_eq!(num_batches(&dataset, 4), 3);
        assert_eq!(num_batches(&dataset, 10), 1);
    }

    #[test]
    fn test_loss_meter_average_and_reset() {
        let mut meter = LossMeter::default();
        assert_eq!(meter.average(), 0.0);

        meter.record(2.0);
        meter.record(4.0);
        assert!((meter.average() - 3.0).abs() < 1e-9);

        // A reset must not leak loss into the next window.
        meter.reset();
        assert_eq!(meter.average(), 0.0);
        meter.record(1.0);
        assert!((meter.average() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_fails_on_unreadable_image() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let dataset = ImageDataset::new(vec![(path, 0)]);
        let model = build_network::<B>(Architecture::Resnet, 8, 2, None, &device);
        let batcher = ImageBatcher::new();

        let result = validate(&model, &dataset, &batcher, &device, 4, LossKind::CrossEntropy);
        assert!(result.is_err());
    }
}
