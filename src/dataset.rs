//! Labeled image datasets
//!
//! A dataset is a JSON file that names a directory of images and lists the
//! ground truth boxes of each image:
//!
//! ```json
//! {
//!   "images_path": "screenshots",
//!   "images": [
//!     {"image_name": "0.png", "ground_truth": [[0, 0, 50, 20]]}
//!   ]
//! }
//! ```
//!
//! A relative `images_path` is resolved against the directory of the JSON
//! file, not against the working directory, and then made absolute. Datasets
//! written with paths relative to the directory a tool was started from have
//! to be moved or rewritten with an absolute `images_path`.
//!
//! Evaluation output has the same layout, so a saved evaluation can be
//! loaded back as a dataset.

use crate::utils::BBox;
use image::DynamicImage;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Dataset loading errors
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read dataset file: {0}")]
    ReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse dataset file {0}: {1}")]
    ParseError(PathBuf, #[source] serde_json::Error),

    #[error("Failed to load image {0}: {1}")]
    ImageError(PathBuf, #[source] image::ImageError),
}

#[derive(Deserialize)]
struct DatasetFile {
    images_path: PathBuf,
    images: Vec<LabeledImage>,
}

/// Ground truth of one image
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabeledImage {
    pub image_name: String,
    #[serde(default)]
    pub ground_truth: Vec<BBox>,
}

/// An image loaded from a dataset together with its ground truth
pub struct Sample {
    pub image: DynamicImage,
    pub path: String,
    pub ground_truth: Vec<BBox>,
}

/// A set of images with marked regions loaded from a JSON file
#[derive(Debug, Clone)]
pub struct JsonDataset {
    path: PathBuf,
    images_path: PathBuf,
    images: Vec<LabeledImage>,
}

impl JsonDataset {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let content =
            fs::read_to_string(&path).map_err(|e| DatasetError::ReadError(path.clone(), e))?;
        let data: DatasetFile = serde_json::from_str(&content)
            .map_err(|e| DatasetError::ParseError(path.clone(), e))?;

        let images_path = match path.parent() {
            Some(dir) if data.images_path.is_relative() => dir.join(&data.images_path),
            _ => data.images_path,
        };
        let images_path = std::path::absolute(&images_path).unwrap_or(images_path);
        debug!(
            "Loaded {} labeled images from {} (images in {})",
            data.images.len(),
            path.display(),
            images_path.display()
        );

        Ok(Self {
            path,
            images_path,
            images: data.images,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that contains the images
    pub fn images_path(&self) -> &Path {
        &self.images_path
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Ground truth boxes of the image named `image_name`
    pub fn ground_truth(&self, image_name: &str) -> Option<&[BBox]> {
        self.images
            .iter()
            .find(|image| image.image_name == image_name)
            .map(|image| image.ground_truth.as_slice())
    }

    /// Load the images in file order
    ///
    /// Images are decoded lazily, one per iteration step.
    pub fn samples(&self) -> impl Iterator<Item = Result<Sample, DatasetError>> + '_ {
        self.images.iter().map(move |labeled| {
            let image_path = self.images_path.join(&labeled.image_name);
            let image = image::open(&image_path)
                .map_err(|e| DatasetError::ImageError(image_path.clone(), e))?;

            Ok(Sample {
                image,
                path: image_path.to_string_lossy().into_owned(),
                ground_truth: labeled.ground_truth.clone(),
            })
        })
    }
}

impl fmt::Display for JsonDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonDataset(path={})", self.path.display())
    }
}
