//! Utility types and functions

pub mod detection;
pub mod geometry;

pub use detection::{
    deduplicate, filter_by_confidence, sort_by_confidence, Detection, DetectionError,
};
pub use geometry::{area, bounding_box, intersect, iou, BBox, XySwap, EPSILON};
