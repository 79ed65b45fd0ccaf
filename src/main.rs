//! flowervision CLI
//!
//! Two subcommands: `train` fine-tunes a pretrained backbone on an
//! image-folder dataset and writes a checkpoint; `predict` loads the
//! checkpoint and reports the top-K categories for a single image.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use flowervision::backend::{backend_name, select_device, TrainingBackend};
use flowervision::checkpoint::{load_checkpoint, CHECKPOINT_FILE};
use flowervision::inference::{predict, print_predictions};
use flowervision::model::Architecture;
use flowervision::training::{run_finetune, FinetuneConfig};
use flowervision::utils::logging::{init_logging, LogConfig};
use flowervision::utils::FlowerVisionError;

/// Transfer learning for flower image classification
#[derive(Parser, Debug)]
#[command(name = "flowervision")]
#[command(version)]
#[command(about = "Fine-tune a pretrained image classifier and run top-K predictions", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune a pretrained network on an image-folder dataset
    Train {
        /// Dataset directory containing train/, valid/ and test/ splits
        data_dir: String,

        /// Directory to write the checkpoint into
        #[arg(short, long, default_value = "checkpoints")]
        save_dir: String,

        /// Backbone architecture (densenet or resnet; unknown names fall
        /// back to densenet)
        #[arg(short, long, default_value = "densenet")]
        arch: String,

        /// Learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Width of the classifier's first hidden layer
        #[arg(long, default_value = "512")]
        hidden_units: usize,

        /// Number of training epochs
        #[arg(short, long, default_value = "5")]
        epochs: usize,

        /// Number of output classes
        #[arg(short, long, default_value = "102")]
        number_of_classes: usize,

        /// Directory with pretrained backbone weight files
        #[arg(long, default_value = "weights")]
        pretrained_dir: String,

        /// Enable random horizontal flip on the training split
        #[arg(long, default_value = "false")]
        augmentation: bool,

        /// Train on the GPU (requires a CUDA build)
        #[arg(long, default_value = "false")]
        gpu: bool,

        /// Random seed for shuffling
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Predict the top-K categories for an image
    Predict {
        /// Path to the input image
        image_path: String,

        /// Directory containing the checkpoint
        #[arg(short, long, default_value = "checkpoints")]
        checkpoint: String,

        /// Number of top predictions to report
        #[arg(short, long, default_value = "5")]
        top_k: usize,

        /// Show probabilities alongside the ranked categories
        #[arg(long, default_value = "false")]
        show_probs: bool,

        /// Number of output classes the checkpoint was trained with
        #[arg(short, long, default_value = "102")]
        number_of_classes: usize,

        /// JSON file mapping class ids to display names
        #[arg(long, default_value = "cat_to_name.json")]
        category_names: String,

        /// Class id of the known true category, printed for comparison
        #[arg(long)]
        expected_class: Option<String>,

        /// Run inference on the GPU (requires a CUDA build)
        #[arg(long, default_value = "false")]
        gpu: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    info!("Starting flowervision on {}", backend_name());

    match cli.command {
        Commands::Train {
            data_dir,
            save_dir,
            arch,
            learning_rate,
            hidden_units,
            epochs,
            number_of_classes,
            pretrained_dir,
            augmentation,
            gpu,
            seed,
        } => {
            let device = select_device(gpu);
            let config = FinetuneConfig {
                arch: Architecture::parse(&arch),
                learning_rate,
                hidden_units,
                epochs,
                num_classes: number_of_classes,
                pretrained_dir: Some(PathBuf::from(pretrained_dir)),
                augment: augmentation,
                seed,
            };

            run_finetune::<TrainingBackend>(&data_dir, &save_dir, &config, device)?;
        }

        Commands::Predict {
            image_path,
            checkpoint,
            top_k,
            show_probs,
            number_of_classes,
            category_names,
            expected_class,
            gpu,
        } => {
            cmd_predict(
                &image_path,
                &checkpoint,
                top_k,
                show_probs,
                number_of_classes,
                &category_names,
                expected_class.as_deref(),
                gpu,
            )?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_predict(
    image_path: &str,
    checkpoint_dir: &str,
    top_k: usize,
    show_probs: bool,
    number_of_classes: usize,
    category_names_path: &str,
    expected_class: Option<&str>,
    gpu: bool,
) -> Result<()> {
    let device = select_device(gpu);

    let category_names: HashMap<String, String> = {
        let json = std::fs::read_to_string(category_names_path)
            .with_context(|| format!("Failed to read category names at {}", category_names_path))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid category-name file at {}", category_names_path))?
    };

    let checkpoint_path = Path::new(checkpoint_dir).join(CHECKPOINT_FILE);
    let (model, meta) = load_checkpoint::<flowervision::DefaultBackend>(
        &checkpoint_path,
        &device,
        number_of_classes,
    )?;

    println!(
        "{}",
        format!("Predicting with {} checkpoint", meta.arch).cyan()
    );

    let predictions = predict(
        Path::new(image_path),
        &model,
        &device,
        &meta.class_from_index,
        &category_names,
        top_k,
    )?;

    let expected_name = match expected_class {
        Some(class_id) => Some(
            category_names
                .get(class_id)
                .ok_or_else(|| FlowerVisionError::UnknownCategory(class_id.to_string()))?
                .as_str(),
        ),
        None => None,
    };

    print_predictions(&predictions, show_probs, expected_name);
    Ok(())
}
