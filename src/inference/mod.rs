//! Inference
//!
//! Image preprocessing and top-K prediction for a trained checkpoint.

pub mod predictor;

pub use predictor::{predict, predict_tensor, print_predictions, process_image, TopPrediction};
