//! Detector that answers with the ground truth of a dataset
//!
//! Useful as an upper bound when benchmarking and for exercising the
//! evaluation pipeline without a model. Behind a slicing proxy every slice
//! gets the ground truth that falls inside it.

use super::{describe, lookup_recorded, restrict_to_fragment, DetectError, DetectParams, Detector};
use crate::dataset::{DatasetError, JsonDataset};
use crate::utils::Detection;
use image::DynamicImage;
use std::fmt;
use std::path::Path;

/// Confidence given to every returned region
pub const STATIC_CONFIDENCE: f32 = 0.999;

pub struct StaticDetector {
    dataset: JsonDataset,
}

impl StaticDetector {
    pub fn new(dataset: JsonDataset) -> Self {
        Self { dataset }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        Ok(Self::new(JsonDataset::from_file(path)?))
    }
}

impl fmt::Display for StaticDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = describe(
            "StaticDetector",
            &[("path", self.dataset.path().display().to_string())],
        );
        f.write_str(&description)
    }
}

impl Detector for StaticDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        path: &str,
        _params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectError> {
        let (regions, fragment) = lookup_recorded(path, |name| self.dataset.ground_truth(name))
            .map_err(|image| DetectError::MissingRegions {
                image,
                dataset: self.dataset.path().to_path_buf(),
            })?;

        let detections = regions
            .iter()
            .map(|region| Detection::from_bbox(*region, STATIC_CONFIDENCE))
            .collect();
        Ok(restrict_to_fragment(detections, fragment))
    }
}
