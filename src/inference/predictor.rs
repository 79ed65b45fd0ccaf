//! Single-image prediction
//!
//! Loads an image, runs it through the trained model in evaluation mode and
//! reports the top-K classes by probability. The model emits
//! log-probabilities, so probabilities are recovered with `exp`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Result;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use colored::Colorize;

use crate::dataset::transform::{
    center_crop, normalize_chw, resize_shorter_side, to_chw_unit, CROP_SIZE, RESIZE_SIZE,
};
use crate::model::FlowerNet;
use crate::utils::error::{self, FlowerVisionError};

/// One ranked prediction
#[derive(Debug, Clone)]
pub struct TopPrediction {
    /// Model class index
    pub index: usize,
    /// Class id from the label mapping
    pub class_id: String,
    /// Human-readable category name
    pub name: String,
    /// Probability in `[0, 1]`
    pub probability: f32,
}

/// Decode and preprocess an image for the network.
///
/// Resizes the shorter side to 256, center-crops to 224x224 and applies
/// ImageNet normalization. Returns the flat CHW buffer.
pub fn process_image(path: &Path) -> error::Result<Vec<f32>> {
    let img = image::open(path)
        .map_err(|e| FlowerVisionError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    let img = resize_shorter_side(&img, RESIZE_SIZE);
    let img = center_crop(&img, CROP_SIZE);

    let mut buffer = to_chw_unit(&img);
    normalize_chw(&mut buffer);
    Ok(buffer)
}

/// Rank the classes of a preprocessed image tensor.
///
/// Every returned index must resolve through the label mapping and the
/// category-name file; a missing entry is an error.
pub fn predict_tensor<B: Backend>(
    model: &FlowerNet<B>,
    image: Tensor<B, 4>,
    class_from_index: &BTreeMap<usize, String>,
    category_names: &HashMap<String, String>,
    top_k: usize,
) -> Result<Vec<TopPrediction>> {
    let output = model.forward(image);
    let probabilities = output.exp();

    let values: Vec<f32> = probabilities
        .into_data()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read probabilities: {:?}", e))?;

    let mut indexed: Vec<(usize, f32)> = values.into_iter().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    indexed
        .into_iter()
        .take(top_k)
        .map(|(index, probability)| {
            let class_id = class_from_index
                .get(&index)
                .ok_or(FlowerVisionError::UnknownClassIndex(index))?
                .clone();
            let name = category_names
                .get(&class_id)
                .ok_or_else(|| FlowerVisionError::UnknownCategory(class_id.clone()))?
                .clone();

            Ok(TopPrediction {
                index,
                class_id,
                name,
                probability,
            })
        })
        .collect()
}

/// Predict the top-K classes of an image file.
pub fn predict<B: Backend>(
    image_path: &Path,
    model: &FlowerNet<B>,
    device: &B::Device,
    class_from_index: &BTreeMap<usize, String>,
    category_names: &HashMap<String, String>,
    top_k: usize,
) -> Result<Vec<TopPrediction>> {
    let buffer = process_image(image_path)?;
    let size = CROP_SIZE as usize;
    let image = Tensor::<B, 4>::from_floats(TensorData::new(buffer, [1, 3, size, size]), device);

    predict_tensor(model, image, class_from_index, category_names, top_k)
}

/// Print ranked predictions, with probabilities when `show_probs` is set.
///
/// `expected` carries the display name of the known true category when the
/// caller asked for it via `--expected-class`.
pub fn print_predictions(
    predictions: &[TopPrediction],
    show_probs: bool,
    expected: Option<&str>,
) {
    println!();
    if show_probs {
        println!(
            "{}",
            format!("  Top {} probabilities:", predictions.len()).cyan().bold()
        );
        println!();
        for prediction in predictions {
            println!(
                "  {}: {:.2}%",
                prediction.name,
                prediction.probability * 100.0
            );
        }
    } else {
        println!("{}", "  The image is most likely a:".cyan().bold());
        println!();
        for prediction in predictions {
            println!("  {}", prediction.name);
        }
    }

    if let Some(true_label) = expected {
        println!();
        println!("  True label: {}", true_label.green());
    }
    println!();
}
