//! Crate-level error handling
//!
//! Each module has its own error enum; `WentralError` wraps them so that
//! drivers like the benchmark and the binary can use `?` across modules.

use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::detector::DetectError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum WentralError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("Failed to load image {0}: {1}")]
    ImageLoadError(PathBuf, #[source] image::ImageError),

    #[error("Failed to write output file {0}: {1}")]
    OutputError(PathBuf, #[source] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    SerializeError(#[from] serde_json::Error),

    #[error("Invalid image size {0}, expected WIDTHxHEIGHT")]
    InvalidImageSize(String),
}

/// Result type alias for convenience
pub type WentralResult<T> = std::result::Result<T, WentralError>;
