//! Error types for the flowervision library.
//!
//! Uses thiserror for ergonomic error definitions. Most application-level
//! code works with `anyhow::Result`; these variants cover the failures the
//! library itself can name precisely.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for flowervision operations
#[derive(Error, Debug)]
pub enum FlowerVisionError {
    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Dataset directory layout problem
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Checkpoint file missing, corrupt, or shape-incompatible
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A model class index has no entry in the label mapping
    #[error("No label recorded for class index {0}")]
    UnknownClassIndex(usize),

    /// A class id has no entry in the category-name file
    #[error("No category name for class id '{0}'")]
    UnknownCategory(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for flowervision operations
pub type Result<T> = std::result::Result<T, FlowerVisionError>;
