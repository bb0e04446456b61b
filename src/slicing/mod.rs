//! Detection on tall and wide screenshots by slicing
//!
//! [`SlicingProxy`] wraps a detector that works best on square-ish images.
//! Images with an extreme aspect ratio are cut into overlapping square
//! slices, every slice goes through the wrapped detector in one batch and
//! the per-slice detections are merged back into image coordinates.

use crate::config::{IOU_THRESHOLD, SLICE_OVERLAP, SLICING_THRESHOLD};
use crate::detector::{describe, DetectError, DetectParams, Detector};
use crate::utils::{BBox, Detection};
use image::DynamicImage;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub mod merge;
pub mod tiler;

pub use merge::{combine_cluster, combine_pair, combine_sequence, to_absolute, to_relative};
pub use tiler::slice_boxes;

/// Identifier of an image fragment: `{path}_{x0},{y0}-{x1},{y1}`
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentId {
    pub path: String,
    pub region: BBox,
}

impl FragmentId {
    pub fn new(path: impl Into<String>, region: BBox) -> Self {
        Self {
            path: path.into(),
            region,
        }
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.path, self.region)
    }
}

impl FromStr for FragmentId {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DetectError::MalformedFragment(s.to_string());

        let (path, coords) = s.rsplit_once('_').ok_or_else(malformed)?;
        let (top_left, bottom_right) = coords.split_once('-').ok_or_else(malformed)?;
        let (x0, y0) = top_left.split_once(',').ok_or_else(malformed)?;
        let (x1, y1) = bottom_right.split_once(',').ok_or_else(malformed)?;

        let parse = |v: &str| v.trim().parse::<f32>().map_err(|_| malformed());
        let region = BBox::new(parse(x0)?, parse(y0)?, parse(x1)?, parse(y1)?);

        Ok(Self::new(path, region))
    }
}

/// Detector proxy that slices images with extreme aspect ratios
///
/// `iou_threshold` decides which detections from adjacent slices are the
/// same object. It is independent of whatever de-duplication the wrapped
/// detector does.
pub struct SlicingProxy<D> {
    detector: D,
    iou_threshold: f32,
    slicing_threshold: f64,
    slice_overlap: f64,
}

impl<D: Detector> SlicingProxy<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            iou_threshold: IOU_THRESHOLD,
            slicing_threshold: SLICING_THRESHOLD,
            slice_overlap: SLICE_OVERLAP,
        }
    }

    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    pub fn with_slicing_threshold(mut self, slicing_threshold: f64) -> Self {
        self.slicing_threshold = slicing_threshold;
        self
    }

    pub fn with_slice_overlap(mut self, slice_overlap: f64) -> Self {
        self.slice_overlap = slice_overlap;
        self
    }

    /// The wrapped detector
    pub fn inner(&self) -> &D {
        &self.detector
    }

    /// Put per-slice results back in slice order, keyed by their fragment id
    fn collate(
        path: &str,
        boxes: &[BBox],
        results: Vec<(String, Vec<Detection>)>,
    ) -> Result<Vec<Vec<Detection>>, DetectError> {
        let mut slots: Vec<Option<Vec<Detection>>> = vec![None; boxes.len()];

        for (fragment, detections) in results {
            let id: FragmentId = fragment.parse()?;
            let index = boxes
                .iter()
                .position(|b| *b == id.region)
                .filter(|_| id.path == path)
                .ok_or_else(|| DetectError::UnknownFragment(fragment.clone()))?;
            slots[index] = Some(detections);
        }

        slots
            .into_iter()
            .zip(boxes)
            .map(|(slot, region)| {
                slot.ok_or_else(|| {
                    DetectError::MissingFragment(FragmentId::new(path, *region).to_string())
                })
            })
            .collect()
    }
}

impl<D: Detector> fmt::Display for SlicingProxy<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = describe(
            "SlicingProxy",
            &[
                ("detector", self.detector.to_string()),
                ("iou_threshold", self.iou_threshold.to_string()),
                ("slicing_threshold", self.slicing_threshold.to_string()),
                ("slice_overlap", self.slice_overlap.to_string()),
            ],
        );
        f.write_str(&description)
    }
}

impl<D: Detector> Detector for SlicingProxy<D> {
    fn detect(
        &self,
        image: &DynamicImage,
        path: &str,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectError> {
        let iou_threshold = params.iou_threshold.unwrap_or(self.iou_threshold);
        let slicing_threshold = params.slicing_threshold.unwrap_or(self.slicing_threshold);
        let slice_overlap = params.slice_overlap.unwrap_or(self.slice_overlap);

        let boxes = slice_boxes(
            (image.width(), image.height()),
            slicing_threshold,
            slice_overlap,
        );
        debug!("Slicing {} into {} fragments", path, boxes.len());

        let fragments: Vec<(DynamicImage, String)> = boxes
            .iter()
            .map(|b| {
                let fragment = image.crop_imm(
                    b.x0 as u32,
                    b.y0 as u32,
                    b.width() as u32,
                    b.height() as u32,
                );
                (fragment, FragmentId::new(path, *b).to_string())
            })
            .collect();

        let results = self.detector.batch_detect(&fragments, &params.forwarded())?;
        let slice_detections = Self::collate(path, &boxes, results)?;

        let detections = combine_sequence(&boxes, &slice_detections, iou_threshold);
        debug!("{} detections in {} after merging", detections.len(), path);

        Ok(detections)
    }
}
