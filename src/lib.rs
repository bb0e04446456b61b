//! Wentral: benchmarking object detectors on web page screenshots
//!
//! Detectors implement the [`Detector`] trait. Tall or wide screenshots can
//! be routed through a [`SlicingProxy`] that runs the detector on square
//! slices and merges the results. The [`benchmark`] module matches
//! detections against labeled datasets and computes precision, recall and
//! mean average precision.

pub mod benchmark;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod slicing;
pub mod utils;

// Re-export commonly used types
pub use benchmark::{evaluate, match_detections, Evaluation, GroundTruthRecord, MatchSet};
pub use config::{AppConfig, BenchmarkConfig, DetectorConfig, DetectorKind, SlicingConfig};
pub use dataset::{JsonDataset, Sample};
pub use detector::{make_detector, DetectError, DetectParams, Detector, JsonDetector, StaticDetector};
pub use error::{WentralError, WentralResult};
pub use slicing::{FragmentId, SlicingProxy};
pub use utils::{BBox, Detection, XySwap};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
