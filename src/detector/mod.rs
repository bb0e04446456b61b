//! Detector abstraction and the detectors that ship with the crate

use crate::config::{AppConfig, DetectorKind};
use crate::error::WentralResult;
use crate::slicing::{to_relative, FragmentId, SlicingProxy};
use crate::utils::{BBox, Detection};
use image::DynamicImage;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub mod json_detector;
pub mod static_detector;

pub use json_detector::JsonDetector;
pub use static_detector::StaticDetector;

/// Per-call detector parameters
///
/// `None` means "use the detector's own default". Keys in `extra` are passed
/// through untouched to detectors that understand them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectParams {
    pub confidence_threshold: Option<f32>,
    pub iou_threshold: Option<f32>,
    pub slicing_threshold: Option<f64>,
    pub slice_overlap: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

impl DetectParams {
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = Some(threshold);
        self
    }

    pub fn with_slicing_threshold(mut self, threshold: f64) -> Self {
        self.slicing_threshold = Some(threshold);
        self
    }

    pub fn with_slice_overlap(mut self, overlap: f64) -> Self {
        self.slice_overlap = Some(overlap);
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Parameters for a wrapped detector: slicing settings are dropped
    pub fn forwarded(&self) -> Self {
        Self {
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            slicing_threshold: None,
            slice_overlap: None,
            extra: self.extra.clone(),
        }
    }
}

/// Object detector for page screenshots
///
/// `Display` should produce `Name(param=value, ...)` with parameters sorted
/// by name, see [`describe`].
pub trait Detector: Send + Sync + fmt::Display {
    /// Detect objects in `image`, returning boxes in image coordinates
    fn detect(
        &self,
        image: &DynamicImage,
        path: &str,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectError>;

    /// Detect objects in several images
    ///
    /// Results are `(path, detections)` pairs in no particular order. The
    /// default implementation runs [`Detector::detect`] in parallel and fails
    /// if any image fails.
    fn batch_detect(
        &self,
        images: &[(DynamicImage, String)],
        params: &DetectParams,
    ) -> Result<Vec<(String, Vec<Detection>)>, DetectError> {
        images
            .par_iter()
            .map(|(image, path)| Ok((path.clone(), self.detect(image, path, params)?)))
            .collect()
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(
        &self,
        image: &DynamicImage,
        path: &str,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectError> {
        (**self).detect(image, path, params)
    }

    fn batch_detect(
        &self,
        images: &[(DynamicImage, String)],
        params: &DetectParams,
    ) -> Result<Vec<(String, Vec<Detection>)>, DetectError> {
        (**self).batch_detect(images, params)
    }
}

/// Detector-related errors
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("No detections data for {0}")]
    MissingDetections(String),

    #[error("Regions information is missing for {image} in {dataset}")]
    MissingRegions { image: String, dataset: PathBuf },

    #[error("Malformed fragment identifier: {0}")]
    MalformedFragment(String),

    #[error("Detections returned for unknown fragment: {0}")]
    UnknownFragment(String),

    #[error("No detections returned for fragment: {0}")]
    MissingFragment(String),

    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse {0}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("Detector failed: {0}")]
    Backend(String),
}

/// `Name(param=value, ...)` with the parameters sorted by name
pub fn describe(name: &str, params: &[(&str, String)]) -> String {
    let mut params = params.to_vec();
    params.sort_by(|a, b| a.0.cmp(b.0));

    let params: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();

    format!("{}({})", name, params.join(", "))
}

/// File name part of an image path, used to look images up by name
pub fn image_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// Recorded data for `path`, looked up by image name
///
/// The path of a slice fragment (see [`FragmentId`]) falls back to the name
/// of the whole image, and the slice region is returned with the data so the
/// caller can cut its boxes down with [`restrict_to_fragment`]. On failure
/// the error holds the image name that was looked up last.
pub fn lookup_recorded<'a, T, F>(path: &str, find: F) -> Result<(&'a [T], Option<BBox>), String>
where
    F: Fn(&str) -> Option<&'a [T]>,
{
    let name = image_name(path);
    if let Some(found) = find(name) {
        return Ok((found, None));
    }

    let Ok(fragment) = path.parse::<FragmentId>() else {
        return Err(name.to_string());
    };
    let base = image_name(&fragment.path);

    find(base)
        .map(|found| (found, Some(fragment.region)))
        .ok_or_else(|| base.to_string())
}

/// Image-level detections as seen by a fragment, in fragment coordinates
///
/// Detections outside the fragment are dropped and the rest are clipped to
/// it. Without a fragment the detections are returned unchanged.
pub fn restrict_to_fragment(detections: Vec<Detection>, fragment: Option<BBox>) -> Vec<Detection> {
    match fragment {
        None => detections,
        Some(region) => detections
            .iter()
            .filter_map(|d| to_relative(d, &region))
            .collect(),
    }
}

/// Create the detector described by `config`
///
/// The detector is wrapped in a [`SlicingProxy`] when slicing is enabled.
pub fn make_detector(config: &AppConfig) -> WentralResult<Box<dyn Detector>> {
    let detector = &config.detector;

    let base: Box<dyn Detector> = match detector.kind {
        DetectorKind::Json => Box::new(JsonDetector::from_file(
            detector.path()?,
            detector.confidence_threshold,
            detector.iou_threshold,
        )?),
        DetectorKind::Static => Box::new(StaticDetector::from_file(detector.path()?)?),
    };

    if !config.slicing.enabled {
        info!("Using detector {}", base);
        return Ok(base);
    }

    let proxy = SlicingProxy::new(base)
        .with_iou_threshold(config.slicing.iou_threshold)
        .with_slicing_threshold(config.slicing.slicing_threshold)
        .with_slice_overlap(config.slicing.slice_overlap);
    info!("Using detector {}", proxy);

    Ok(Box::new(proxy))
}
