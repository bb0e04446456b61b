//! Detection data structures and utilities

use super::geometry::{BBox, XySwap};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// A detected object: a box with a confidence score
///
/// On the wire a detection is `[x0, y0, x1, y1, confidence]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 5]")]
pub struct Detection {
    pub bbox: BBox,
    /// Confidence score in (0.0, 1.0]
    pub confidence: f32,
}

impl Detection {
    /// Create a new detection
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32, confidence: f32) -> Self {
        Self {
            bbox: BBox::new(x0, y0, x1, y1),
            confidence,
        }
    }

    pub const fn from_bbox(bbox: BBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }

    /// Calculate the area of the bounding box
    pub fn area(&self) -> f32 {
        self.bbox.area()
    }

    /// Calculate Intersection over Union (IoU) with another detection
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    /// Same detection moved by `(dx, dy)`
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::from_bbox(self.bbox.offset(dx, dy), self.confidence)
    }

    pub fn to_array(&self) -> [f32; 5] {
        let [x0, y0, x1, y1] = self.bbox.to_array();
        [x0, y0, x1, y1, self.confidence]
    }
}

impl XySwap for Detection {
    fn xy_swap(&self) -> Self {
        Self::from_bbox(self.bbox.xy_swap(), self.confidence)
    }
}

impl From<Detection> for [f32; 5] {
    fn from(detection: Detection) -> Self {
        detection.to_array()
    }
}

impl TryFrom<Vec<f32>> for Detection {
    type Error = DetectionError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [x0, y0, x1, y1, confidence, ..] => Ok(Detection::new(*x0, *y0, *x1, *y1, *confidence)),
            _ => Err(DetectionError::InvalidBoundingBox {
                expected: 5,
                found: values.len(),
            }),
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection(confidence={:.2}, bbox=({:.1}, {:.1}, {:.1}, {:.1}))",
            self.confidence, self.bbox.x0, self.bbox.y0, self.bbox.x1, self.bbox.y1
        )
    }
}

/// Errors decoding boxes and detections from their wire format
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Invalid bounding box: expected at least {expected} values, got {found}")]
    InvalidBoundingBox { expected: usize, found: usize },
}

/// Descending confidence order
pub fn by_confidence_desc(a: &Detection, b: &Detection) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
}

/// Stable sort by confidence, highest first; ties keep their input order
pub fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(by_confidence_desc);
}

/// Greedy de-duplication of a list of detections
///
/// Detections are visited in descending confidence order and a detection is
/// dropped when its IoU with any detection kept so far is at least
/// `iou_threshold`.
pub fn deduplicate(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    sort_by_confidence(&mut detections);

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());

    for detection in detections {
        let duplicate = keep
            .iter()
            .any(|kept| kept.iou(&detection) >= iou_threshold);

        if !duplicate {
            keep.push(detection);
        }
    }

    keep
}

/// Filter detections by confidence threshold
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}
