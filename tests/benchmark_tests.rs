//! End-to-end benchmark tests
//!
//! Builds a small dataset of PNG files on disk, evaluates the bundled
//! detectors on it and reads the written evaluation back.

use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wentral::config::{AppConfig, DetectorKind, Overrides};
use wentral::{
    evaluate, make_detector, BBox, DetectError, DetectParams, JsonDataset, JsonDetector,
    StaticDetector, WentralError,
};

const DATASET: &str = r#"{
    "images_path": "images",
    "images": [
        {"image_name": "0.png", "ground_truth": [[0, 0, 50, 20], [80, 10, 95, 50]]},
        {"image_name": "1.png", "ground_truth": [[10, 10, 80, 25]]},
        {"image_name": "2.png", "ground_truth": [[0, 0, 20, 20], [30, 30, 40, 40], [60, 60, 90, 90]]}
    ]
}"#;

const DETECTIONS: &str = r#"{
    "images": [
        {"image_name": "0.png", "detections": [
            [0, 0, 50, 20, 0.9], [82, 12, 94, 45, 0.8], [0, 70, 50, 90, 0.7]
        ]},
        {"image_name": "1.png", "detections": [
            [10, 10, 80, 25, 0.9], [10, 30, 30, 60, 0.6]
        ]},
        {"image_name": "2.png", "detections": [
            [5, 5, 15, 15, 0.7], [20, 20, 50, 50, 0.6], [60, 60, 90, 90, 0.9]
        ]}
    ]
}"#;

/// Dataset and recorded detections in a temporary directory
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        fs::create_dir(&images).unwrap();

        for name in ["0.png", "1.png", "2.png"] {
            RgbImage::new(100, 100).save(images.join(name)).unwrap();
        }

        fs::write(dir.path().join("dataset.json"), DATASET).unwrap();
        fs::write(dir.path().join("detections.json"), DETECTIONS).unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn dataset(&self) -> JsonDataset {
        JsonDataset::from_file(self.path("dataset.json")).unwrap()
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_static_detector_is_perfect() {
    let fixture = Fixture::new();
    let detector = StaticDetector::from_file(fixture.path("dataset.json")).unwrap();

    let evaluation = evaluate(&fixture.dataset(), &detector, DetectParams::default(), 0.5, 0.4)
        .unwrap();

    assert_eq!(evaluation.image_count, 3);
    assert_eq!((evaluation.tp, evaluation.fn_, evaluation.fp), (6, 0, 0));
    assert_close(evaluation.precision, 1.0);
    assert_close(evaluation.recall, 1.0);
    assert_close(evaluation.map, 1.0);
}

#[test]
fn test_json_detector_evaluation() {
    let fixture = Fixture::new();
    let detector = JsonDetector::with_defaults(fixture.path("detections.json")).unwrap();

    let evaluation = evaluate(&fixture.dataset(), &detector, DetectParams::default(), 0.5, 0.4)
        .unwrap();

    assert_eq!((evaluation.tp, evaluation.fn_, evaluation.fp), (4, 2, 4));
    assert_close(evaluation.precision, 0.5);
    assert_close(evaluation.recall, 2.0 / 3.0);
    assert_close(evaluation.map, 0.75);

    let counts: Vec<(usize, usize, usize)> = evaluation
        .matchsets
        .iter()
        .map(|ms| (ms.tp(), ms.fn_(), ms.fp()))
        .collect();
    assert_eq!(counts, vec![(2, 0, 1), (1, 0, 1), (1, 2, 2)]);
}

#[test]
fn test_higher_confidence_threshold_drops_detections() {
    let fixture = Fixture::new();
    let detector = JsonDetector::with_defaults(fixture.path("detections.json")).unwrap();

    let evaluation = evaluate(&fixture.dataset(), &detector, DetectParams::default(), 0.85, 0.4)
        .unwrap();

    // Only the 0.9 detections are counted: three hits, no false alarms.
    assert_eq!((evaluation.tp, evaluation.fn_, evaluation.fp), (3, 3, 0));
    assert_close(evaluation.precision, 1.0);
}

#[test]
fn test_evaluation_output_round_trip() {
    let fixture = Fixture::new();
    let detector = JsonDetector::with_defaults(fixture.path("detections.json")).unwrap();
    let evaluation = evaluate(&fixture.dataset(), &detector, DetectParams::default(), 0.5, 0.4)
        .unwrap();

    let output = fixture.path("evaluation.json");
    evaluation.to_json_file(&output).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["tp"], 4);
    assert_eq!(json["fn"], 2);
    assert_eq!(json["fp"], 4);
    assert_eq!(json["image_count"], 3);
    assert_eq!(json["images"].as_array().unwrap().len(), 3);
    assert!(json["detector"].as_str().unwrap().starts_with("JsonDetector("));

    // The output is a dataset with the same ground truth...
    let reloaded = JsonDataset::from_file(&output).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(
        reloaded.ground_truth("1.png").unwrap(),
        &[BBox::new(10.0, 10.0, 80.0, 25.0)]
    );
    assert!(reloaded.images_path().join("0.png").is_file());

    // ...and a recording of the detections, which replays to the same result.
    let replay = JsonDetector::with_defaults(&output).unwrap();
    let again = evaluate(&reloaded, &replay, DetectParams::default(), 0.5, 0.4).unwrap();
    assert_eq!((again.tp, again.fn_, again.fp), (4, 2, 4));
    assert_close(again.map, evaluation.map);
}

#[test]
fn test_missing_detections_fail_the_run() {
    let fixture = Fixture::new();
    fs::write(
        fixture.path("partial.json"),
        r#"{"images": [{"image_name": "0.png", "detections": []}]}"#,
    )
    .unwrap();
    let detector = JsonDetector::with_defaults(fixture.path("partial.json")).unwrap();

    let result = evaluate(&fixture.dataset(), &detector, DetectParams::default(), 0.5, 0.4);
    match result {
        Err(WentralError::Detect(DetectError::MissingDetections(name))) => {
            assert_eq!(name, "1.png")
        }
        other => panic!("Expected missing detections, got {:?}", other.map(|e| e.tp)),
    }
}

#[test]
fn test_missing_image_fails_the_run() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.path("images").join("2.png")).unwrap();
    let detector = StaticDetector::from_file(fixture.path("dataset.json")).unwrap();

    let result = evaluate(&fixture.dataset(), &detector, DetectParams::default(), 0.5, 0.4);
    assert!(matches!(result, Err(WentralError::Dataset(_))));
}

fn configured(kind: DetectorKind, path: &Path, slicing: bool) -> AppConfig {
    AppConfig::default().with_overrides(&Overrides {
        detector: Some(kind),
        path: Some(path.to_path_buf()),
        slicing,
        ..Overrides::default()
    })
}

#[test]
fn test_make_detector() {
    let fixture = Fixture::new();

    let detector = make_detector(&configured(
        DetectorKind::Json,
        &fixture.path("detections.json"),
        false,
    ))
    .unwrap();
    assert!(detector.to_string().starts_with("JsonDetector("));

    let detector = make_detector(&configured(
        DetectorKind::Static,
        &fixture.path("dataset.json"),
        true,
    ))
    .unwrap();
    assert!(detector.to_string().starts_with("SlicingProxy(detector=StaticDetector("));
}

#[test]
fn test_make_detector_errors() {
    let fixture = Fixture::new();

    let config = AppConfig::default();
    assert!(matches!(make_detector(&config), Err(WentralError::Config(_))));

    let config = configured(DetectorKind::Json, &fixture.path("nope.json"), false);
    assert!(matches!(
        make_detector(&config),
        Err(WentralError::Detect(DetectError::Io(..)))
    ));
}

#[test]
fn test_configured_detector_evaluation() {
    let fixture = Fixture::new();
    let detector = make_detector(&configured(
        DetectorKind::Json,
        &fixture.path("detections.json"),
        false,
    ))
    .unwrap();

    let evaluation = evaluate(
        &fixture.dataset(),
        detector.as_ref(),
        DetectParams::default(),
        0.5,
        0.4,
    )
    .unwrap();
    assert_eq!((evaluation.tp, evaluation.fn_, evaluation.fp), (4, 2, 4));
}

/// A tall screenshot that gets sliced and a square one that doesn't
///
/// The tall image is 100x250, which slices into `0-100`, `75-175` and
/// `150-250` along y. Its second box crosses from the first slice into the
/// second.
fn sliced_fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("images");
    fs::create_dir(&images).unwrap();
    RgbImage::new(100, 250).save(images.join("tall.png")).unwrap();
    RgbImage::new(100, 100).save(images.join("square.png")).unwrap();

    fs::write(
        dir.path().join("dataset.json"),
        r#"{"images_path": "images", "images": [
            {"image_name": "tall.png", "ground_truth": [[10, 10, 60, 40], [20, 60, 80, 120], [30, 200, 70, 240]]},
            {"image_name": "square.png", "ground_truth": [[10, 10, 80, 25]]}
        ]}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("detections.json"),
        r#"{"images": [
            {"image_name": "tall.png", "detections": [[10, 10, 60, 40, 0.9], [20, 60, 80, 120, 0.8], [30, 200, 70, 240, 0.7]]},
            {"image_name": "square.png", "detections": [[10, 10, 80, 25, 0.9]]}
        ]}"#,
    )
    .unwrap();

    dir
}

#[test]
fn test_sliced_detectors_evaluate_like_unsliced() {
    let dir = sliced_fixture();
    let dataset = JsonDataset::from_file(dir.path().join("dataset.json")).unwrap();

    for (kind, file) in [
        (DetectorKind::Static, "dataset.json"),
        (DetectorKind::Json, "detections.json"),
    ] {
        let detector = make_detector(&configured(kind, &dir.path().join(file), true)).unwrap();
        assert!(detector.to_string().starts_with("SlicingProxy("));

        let evaluation = evaluate(&dataset, detector.as_ref(), DetectParams::default(), 0.5, 0.4)
            .unwrap_or_else(|e| panic!("{kind} detector failed: {e}"));

        assert_eq!((evaluation.tp, evaluation.fn_, evaluation.fp), (4, 0, 0), "{kind}");
        assert_close(evaluation.map, 1.0);

        // The box split between two slices comes back whole.
        let tall = &evaluation.matchsets[0];
        assert_eq!(tall.image_name, "tall.png");
        assert_eq!(tall.detections().len(), 3, "{kind}");
        assert!(
            tall.detections()
                .iter()
                .any(|d| d.bbox == BBox::new(20.0, 60.0, 80.0, 120.0)),
            "{kind}: {:?}",
            tall.detections()
        );

        let square = &evaluation.matchsets[1];
        assert_eq!(
            square.detections().iter().map(|d| d.bbox).collect::<Vec<_>>(),
            vec![BBox::new(10.0, 10.0, 80.0, 25.0)]
        );
    }
}
