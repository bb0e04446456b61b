//! Configuration system tests
//! Tests TOML configuration parsing, validation, and command line overrides

use std::fs;
use tempfile::TempDir;
use wentral::config::{
    parse_extra, AppConfig, ConfigError, DetectorKind, Overrides, CONF_THRESHOLD, IOU_THRESHOLD,
    MATCH_IOU, SLICE_OVERLAP, SLICING_THRESHOLD,
};

const FULL_CONFIG: &str = r#"
[detector]
kind = "json"
path = "runs/detections.json"
confidence_threshold = 0.6
iou_threshold = 0.3

[detector.extra]
model = "v2"

[slicing]
enabled = true
iou_threshold = 0.5
slicing_threshold = 0.8
slice_overlap = 0.25

[benchmark]
confidence_threshold = 0.7
match_iou = 0.5
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("wentral.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_full_configuration() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::from_toml_file(&write_config(&dir, FULL_CONFIG)).unwrap();

    assert_eq!(config.detector.kind, DetectorKind::Json);
    assert_eq!(
        config.detector.path().unwrap(),
        std::path::Path::new("runs/detections.json")
    );
    assert_eq!(config.detector.confidence_threshold, 0.6);
    assert_eq!(config.detector.extra.get("model").map(String::as_str), Some("v2"));
    assert!(config.slicing.enabled);
    assert_eq!(config.slicing.slicing_threshold, 0.8);
    assert_eq!(config.slicing.slice_overlap, 0.25);
    assert_eq!(config.benchmark.match_iou, 0.5);
}

#[test]
fn test_partial_configuration_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[benchmark]\nmatch_iou = 0.6\n");
    let config = AppConfig::from_toml_file(&path).unwrap();

    assert_eq!(config.benchmark.match_iou, 0.6);
    assert_eq!(config.benchmark.confidence_threshold, CONF_THRESHOLD);
    assert_eq!(config.detector.iou_threshold, IOU_THRESHOLD);
    assert_eq!(config.slicing.slicing_threshold, SLICING_THRESHOLD);
    assert_eq!(config.slicing.slice_overlap, SLICE_OVERLAP);
    assert!(!config.slicing.enabled);

    let empty = AppConfig::from_toml_file(&write_config(&dir, "")).unwrap();
    assert_eq!(empty.benchmark.match_iou, MATCH_IOU);
}

#[test]
fn test_invalid_configuration() {
    let dir = TempDir::new().unwrap();

    let out_of_range = write_config(&dir, "[benchmark]\nmatch_iou = 1.5\n");
    assert!(matches!(
        AppConfig::from_toml_file(&out_of_range),
        Err(ConfigError::InvalidValue(_))
    ));

    let bad_kind = write_config(&dir, "[detector]\nkind = \"onnx\"\n");
    assert!(matches!(
        AppConfig::from_toml_file(&bad_kind),
        Err(ConfigError::ParseError(_))
    ));

    let bad_type = write_config(&dir, "[slicing]\nenabled = \"yes\"\n");
    assert!(matches!(
        AppConfig::from_toml_file(&bad_type),
        Err(ConfigError::ParseError(_))
    ));

    assert!(matches!(
        AppConfig::from_toml_file(&dir.path().join("missing.toml")),
        Err(ConfigError::FileReadError(..))
    ));
}

#[test]
fn test_overrides_take_precedence() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::from_toml_file(&write_config(&dir, FULL_CONFIG)).unwrap();

    let config = config.with_overrides(&Overrides {
        detector: Some(DetectorKind::Static),
        confidence_threshold: Some(0.2),
        iou_threshold: Some(0.9),
        extra: vec![("model".to_string(), "v3".to_string())],
        slice_overlap: Some(0.1),
        ..Overrides::default()
    });

    assert_eq!(config.detector.kind, DetectorKind::Static);
    assert_eq!(config.detector.confidence_threshold, 0.2);
    assert_eq!(config.benchmark.confidence_threshold, 0.2);
    assert_eq!(config.detector.iou_threshold, 0.9);
    assert_eq!(config.slicing.iou_threshold, 0.9);
    assert_eq!(config.detector.extra.get("model").map(String::as_str), Some("v3"));
    assert_eq!(config.slicing.slice_overlap, 0.1);
    // Untouched values come from the file.
    assert_eq!(config.benchmark.match_iou, 0.5);
    assert_eq!(config.slicing.slicing_threshold, 0.8);
    // Slicing enabled in the file stays enabled.
    assert!(config.slicing.enabled);
}

#[test]
fn test_overrides_can_make_config_invalid() {
    let config = AppConfig::default().with_overrides(&Overrides {
        slice_overlap: Some(1.0),
        ..Overrides::default()
    });
    assert!(config.validate().is_err());

    let config = AppConfig::default().with_overrides(&Overrides {
        slicing_threshold: Some(0.0),
        ..Overrides::default()
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saved.toml");

    let config = AppConfig::default().with_overrides(&Overrides {
        detector: Some(DetectorKind::Static),
        path: Some("data/dataset.json".into()),
        slicing: true,
        extra: vec![("device".to_string(), "cpu".to_string())],
        ..Overrides::default()
    });
    config.to_toml_file(&path).unwrap();

    let reloaded = AppConfig::from_toml_file(&path).unwrap();
    assert_eq!(reloaded.detector.kind, DetectorKind::Static);
    assert_eq!(reloaded.detector.path, config.detector.path);
    assert_eq!(reloaded.detector.extra, config.detector.extra);
    assert!(reloaded.slicing.enabled);
}

#[test]
fn test_extra_arguments() {
    assert_eq!(
        parse_extra("threshold=0.3").unwrap(),
        ("threshold".to_string(), "0.3".to_string())
    );
    assert_eq!(
        parse_extra("url=http://host/?a=b").unwrap(),
        ("url".to_string(), "http://host/?a=b".to_string())
    );
    assert_eq!(parse_extra("empty=").unwrap(), ("empty".to_string(), String::new()));
    assert!(parse_extra("novalue").is_err());
    assert!(parse_extra("=value").is_err());
}

#[test]
fn test_detector_kind_parsing() {
    assert_eq!("json".parse::<DetectorKind>().unwrap(), DetectorKind::Json);
    assert_eq!("static".parse::<DetectorKind>().unwrap(), DetectorKind::Static);
    assert!("yolo".parse::<DetectorKind>().is_err());
    assert_eq!(DetectorKind::Static.to_string(), "static");
}
