//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Level of confidence that we count as detection
pub const CONF_THRESHOLD: f32 = 0.5;
/// IoU above which two boxes are considered the same
pub const IOU_THRESHOLD: f32 = 0.4;
/// Aspect ratio below which images are sliced
pub const SLICING_THRESHOLD: f64 = 0.7;
/// Fraction of a slice shared with the next one
pub const SLICE_OVERLAP: f64 = 0.2;
/// IoU above which a detection matches ground truth
pub const MATCH_IOU: f32 = 0.4;

/// Available detector implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Detections recorded in a JSON file
    Json,
    /// Ground truth of a dataset
    Static,
}

impl FromStr for DetectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(DetectorKind::Json),
            "static" => Ok(DetectorKind::Static),
            other => Err(ConfigError::InvalidValue(format!(
                "unsupported detector: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Json => write!(f, "json"),
            DetectorKind::Static => write!(f, "static"),
        }
    }
}

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    /// Detections file (json) or dataset file (static)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Minimum confidence of reported detections
    pub confidence_threshold: f32,
    /// IoU at which two detections are duplicates
    pub iou_threshold: f32,
    /// Extra parameters passed to the detector verbatim
    pub extra: BTreeMap<String, String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Json,
            path: None,
            confidence_threshold: CONF_THRESHOLD,
            iou_threshold: IOU_THRESHOLD,
            extra: BTreeMap::new(),
        }
    }
}

impl DetectorConfig {
    /// Path the detector loads its data from
    pub fn path(&self) -> Result<&Path, ConfigError> {
        self.path.as_deref().ok_or_else(|| {
            ConfigError::InvalidValue(format!("{} detector requires a path", self.kind))
        })
    }
}

/// Slicing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicingConfig {
    /// Wrap the detector in a slicing proxy
    pub enabled: bool,
    /// IoU at which detections from adjacent slices are merged
    pub iou_threshold: f32,
    pub slicing_threshold: f64,
    pub slice_overlap: f64,
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            iou_threshold: IOU_THRESHOLD,
            slicing_threshold: SLICING_THRESHOLD,
            slice_overlap: SLICE_OVERLAP,
        }
    }
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Minimum confidence of a detection to be counted
    pub confidence_threshold: f32,
    /// Minimum IoU of a detection with ground truth to be correct
    pub match_iou: f32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: CONF_THRESHOLD,
            match_iou: MATCH_IOU,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub slicing: SlicingConfig,
    pub benchmark: BenchmarkConfig,
}

/// Values given on the command line, applied over a loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub detector: Option<DetectorKind>,
    pub path: Option<PathBuf>,
    pub confidence_threshold: Option<f32>,
    pub iou_threshold: Option<f32>,
    pub match_iou: Option<f32>,
    pub extra: Vec<(String, String)>,
    pub slicing: bool,
    pub slicing_threshold: Option<f64>,
    pub slice_overlap: Option<f64>,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_toml_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(format!("TOML serialize error: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::FileWriteError(path.to_path_buf(), e))?;

        Ok(())
    }

    /// Apply command line values
    ///
    /// The confidence threshold applies to both the detector and the
    /// benchmark; turning slicing on is sticky.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(kind) = overrides.detector {
            self.detector.kind = kind;
        }

        if let Some(path) = &overrides.path {
            self.detector.path = Some(path.clone());
        }

        if let Some(threshold) = overrides.confidence_threshold {
            self.detector.confidence_threshold = threshold;
            self.benchmark.confidence_threshold = threshold;
        }

        if let Some(threshold) = overrides.iou_threshold {
            self.detector.iou_threshold = threshold;
            self.slicing.iou_threshold = threshold;
        }

        if let Some(match_iou) = overrides.match_iou {
            self.benchmark.match_iou = match_iou;
        }

        for (name, value) in &overrides.extra {
            self.detector.extra.insert(name.clone(), value.clone());
        }

        self.slicing.enabled |= overrides.slicing;

        if let Some(threshold) = overrides.slicing_threshold {
            self.slicing.slicing_threshold = threshold;
        }

        if let Some(overlap) = overrides.slice_overlap {
            self.slicing.slice_overlap = overlap;
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_ranged = [
            ("detector.confidence_threshold", self.detector.confidence_threshold),
            ("detector.iou_threshold", self.detector.iou_threshold),
            ("slicing.iou_threshold", self.slicing.iou_threshold),
            ("benchmark.confidence_threshold", self.benchmark.confidence_threshold),
            ("benchmark.match_iou", self.benchmark.match_iou),
        ];

        for (name, value) in unit_ranged {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        let threshold = self.slicing.slicing_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "slicing.slicing_threshold must be in (0.0, 1.0], got {}",
                threshold
            )));
        }

        if !(0.0..1.0).contains(&self.slicing.slice_overlap) {
            return Err(ConfigError::InvalidValue(format!(
                "slicing.slice_overlap must be in [0.0, 1.0), got {}",
                self.slicing.slice_overlap
            )));
        }

        Ok(())
    }
}

/// Parse a `NAME=VALUE` pair
pub fn parse_extra(arg: &str) -> Result<(String, String), ConfigError> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(ConfigError::InvalidValue(format!(
            "extra parameter must be NAME=VALUE, got {}",
            arg
        ))),
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileReadError(PathBuf, std::io::Error),

    #[error("Failed to write config file {0}: {1}")]
    FileWriteError(PathBuf, std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(String),

    #[error("Config serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
