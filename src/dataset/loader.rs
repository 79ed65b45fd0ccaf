//! Image-folder dataset loader
//!
//! Datasets follow the filesystem convention
//! `<data_dir>/{train,valid,test}/<class_id>/<image files>`. Class ids are
//! the subdirectory names of a split, indexed in sorted order; the
//! index-to-id mapping derived from the training split is the label mapping
//! persisted in checkpoints.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::FlowerVisionError;

/// Image file extensions considered part of the dataset
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single image sample with its label
#[derive(Debug, Clone)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class id (the subdirectory name, e.g. "52")
    pub class_id: String,
}

/// One split of an image-folder dataset
#[derive(Debug)]
pub struct ImageFolder {
    /// Root directory of the split
    pub root_dir: PathBuf,
    /// All samples in the split
    pub samples: Vec<ImageSample>,
    /// Mapping from class id to label index
    pub class_to_idx: HashMap<String, usize>,
    /// Mapping from label index to class id
    pub idx_to_class: BTreeMap<usize, String>,
}

impl ImageFolder {
    /// Scan a split directory laid out as one subfolder per class.
    pub fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();

        if !root_dir.exists() {
            return Err(FlowerVisionError::Dataset(format!(
                "directory does not exist: {:?}",
                root_dir
            ))
            .into());
        }

        let mut class_dirs: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)
            .with_context(|| format!("Failed to read dataset directory {:?}", root_dir))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_dirs.push(name.to_string());
                }
            }
        }
        class_dirs.sort();

        if class_dirs.is_empty() {
            return Err(FlowerVisionError::Dataset(format!(
                "no class subdirectories found in {:?}",
                root_dir
            ))
            .into());
        }

        let class_to_idx: HashMap<String, usize> = class_dirs
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let idx_to_class: BTreeMap<usize, String> = class_dirs
            .iter()
            .enumerate()
            .map(|(idx, name)| (idx, name.clone()))
            .collect();

        let mut samples = Vec::new();
        for class_id in &class_dirs {
            let class_dir = root_dir.join(class_id);
            let label = class_to_idx[class_id];

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path().to_path_buf();
                if let Some(ext) = path.extension() {
                    let ext = ext.to_string_lossy().to_lowercase();
                    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                        samples.push(ImageSample {
                            path,
                            label,
                            class_id: class_id.clone(),
                        });
                    }
                }
            }

            debug!("Class '{}' mapped to label {}", class_id, label);
        }

        info!(
            "Loaded {} samples across {} classes from {:?}",
            samples.len(),
            class_dirs.len(),
            root_dir
        );

        Ok(Self {
            root_dir,
            samples,
            class_to_idx,
            idx_to_class,
        })
    }

    /// Number of samples in the split
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the split holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.class_to_idx.len()
    }

    /// Shuffle the samples in place with a seeded RNG.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
    }

    /// Per-class sample counts, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

/// The three splits of a transfer-learning dataset
#[derive(Debug)]
pub struct FlowerSplits {
    pub train: ImageFolder,
    pub valid: ImageFolder,
    pub test: ImageFolder,
}

impl FlowerSplits {
    /// Open `<data_dir>/{train,valid,test}`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        info!("Using {:?} data", data_dir);

        Ok(Self {
            train: ImageFolder::open(data_dir.join("train"))?,
            valid: ImageFolder::open(data_dir.join("valid"))?,
            test: ImageFolder::open(data_dir.join("test"))?,
        })
    }

    /// The label mapping persisted in checkpoints: label index to class id,
    /// derived from the training split.
    pub fn class_from_index(&self) -> BTreeMap<usize, String> {
        self.train.idx_to_class.clone()
    }

    /// Print a short summary of the splits.
    pub fn print_stats(&self) {
        println!("\nDataset:");
        println!("  Classes:            {}", self.train.num_classes());
        println!("  Training samples:   {}", self.train.len());
        println!("  Validation samples: {}", self.valid.len());
        println!("  Test samples:       {}", self.test.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build `<root>/<split>/<class>/img.png` fixtures with 2x2 images.
    fn write_fixture(root: &Path, split: &str, classes: &[&str], images_per_class: usize) {
        for class in classes {
            let dir = root.join(split).join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..images_per_class {
                let pixels = vec![128u8; 2 * 2 * 3];
                image::save_buffer(
                    dir.join(format!("img_{}.png", i)),
                    &pixels,
                    2,
                    2,
                    image::ExtendedColorType::Rgb8,
                )
                .unwrap();
            }
        }
    }

    #[test]
    fn test_image_folder_class_mapping_is_bijective() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(tmp.path(), "train", &["1", "10", "2"], 2);

        let folder = ImageFolder::open(tmp.path().join("train")).unwrap();

        assert_eq!(folder.num_classes(), 3);
        assert_eq!(folder.len(), 6);

        // Sorted lexicographically: "1", "10", "2"
        assert_eq!(folder.class_to_idx["1"], 0);
        assert_eq!(folder.class_to_idx["10"], 1);
        assert_eq!(folder.class_to_idx["2"], 2);

        for (idx, class_id) in &folder.idx_to_class {
            assert_eq!(folder.class_to_idx[class_id], *idx);
        }

        assert_eq!(folder.class_counts(), vec![2, 2, 2]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let err = ImageFolder::open("/nonexistent/dataset/train").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowerVisionError>(),
            Some(FlowerVisionError::Dataset(_))
        ));
    }

    #[test]
    fn test_split_without_class_dirs_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ImageFolder::open(tmp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowerVisionError>(),
            Some(FlowerVisionError::Dataset(_))
        ));
    }

    #[test]
    fn test_splits_open_all_three() {
        let tmp = tempfile::tempdir().unwrap();
        for split in ["train", "valid", "test"] {
            write_fixture(tmp.path(), split, &["a", "b"], 1);
        }

        let splits = FlowerSplits::open(tmp.path()).unwrap();
        assert_eq!(splits.train.len(), 2);
        assert_eq!(splits.valid.len(), 2);
        assert_eq!(splits.test.len(), 2);

        let mapping = splits.class_from_index();
        assert_eq!(mapping[&0], "a");
        assert_eq!(mapping[&1], "b");
    }
}
