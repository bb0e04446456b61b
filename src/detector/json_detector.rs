//! Detector that replays detections recorded in a JSON file
//!
//! The file has the layout of an evaluation output: an `images` list whose
//! entries carry `image_name` and `detections`. Confidence filtering and
//! IoU de-duplication are applied again on every call, so the same file can
//! be replayed with different thresholds. Slice fragments get the recorded
//! detections of their image cut to the slice.

use super::{describe, lookup_recorded, restrict_to_fragment, DetectError, DetectParams, Detector};
use crate::config::{CONF_THRESHOLD, IOU_THRESHOLD};
use crate::utils::{deduplicate, filter_by_confidence, Detection};
use image::DynamicImage;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize)]
struct RecordedRun {
    images: Vec<RecordedImage>,
}

#[derive(Deserialize)]
struct RecordedImage {
    image_name: String,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Detector backed by a JSON file of recorded detections
pub struct JsonDetector {
    path: PathBuf,
    confidence_threshold: f32,
    iou_threshold: f32,
    detections: HashMap<String, Vec<Detection>>,
}

impl JsonDetector {
    /// Load recorded detections from `path`
    pub fn from_file(
        path: impl AsRef<Path>,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Self, DetectError> {
        let path = path.as_ref().to_path_buf();
        let content =
            fs::read_to_string(&path).map_err(|e| DetectError::Io(path.clone(), e))?;
        let run: RecordedRun =
            serde_json::from_str(&content).map_err(|e| DetectError::Json(path.clone(), e))?;

        let detections: HashMap<String, Vec<Detection>> = run
            .images
            .into_iter()
            .map(|image| (image.image_name, image.detections))
            .collect();
        debug!("Loaded detections for {} images from {}", detections.len(), path.display());

        Ok(Self {
            path,
            confidence_threshold,
            iou_threshold,
            detections,
        })
    }

    /// Load with the default thresholds
    pub fn with_defaults(path: impl AsRef<Path>) -> Result<Self, DetectError> {
        Self::from_file(path, CONF_THRESHOLD, IOU_THRESHOLD)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for JsonDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = describe(
            "JsonDetector",
            &[
                ("path", self.path.display().to_string()),
                ("confidence_threshold", self.confidence_threshold.to_string()),
                ("iou_threshold", self.iou_threshold.to_string()),
            ],
        );
        f.write_str(&description)
    }
}

impl Detector for JsonDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        path: &str,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectError> {
        let confidence_threshold = params
            .confidence_threshold
            .unwrap_or(self.confidence_threshold);
        let iou_threshold = params.iou_threshold.unwrap_or(self.iou_threshold);

        let (recorded, fragment) =
            lookup_recorded(path, |name| self.detections.get(name).map(Vec::as_slice))
                .map_err(DetectError::MissingDetections)?;

        let detections = filter_by_confidence(recorded.to_vec(), confidence_threshold);
        Ok(restrict_to_fragment(
            deduplicate(detections, iou_threshold),
            fragment,
        ))
    }
}
