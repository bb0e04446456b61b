//! Benchmarking detectors against labeled datasets
//!
//! Detections of every image are matched to its ground truth in a
//! [`MatchSet`]; the match sets of a whole dataset are summarized in an
//! [`Evaluation`] that also carries the mean average precision.

use crate::dataset::{DatasetError, JsonDataset, Sample};
use crate::detector::{image_name, DetectParams, Detector};
use crate::error::{WentralError, WentralResult};
use crate::utils::{sort_by_confidence, BBox, Detection};
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod prc;

pub use prc::{area_under_curve, average_precision, interpolate, precision_recall_curve, PrPoint};

/// `tp / (tp + fp)`, or 1 when there are no false positives
pub fn precision(tp: usize, fp: usize) -> f64 {
    if fp == 0 {
        1.0
    } else {
        tp as f64 / (tp + fp) as f64
    }
}

/// `tp / (tp + fn)`, or 1 when nothing was missed
pub fn recall(tp: usize, fn_: usize) -> f64 {
    if fn_ == 0 {
        1.0
    } else {
        tp as f64 / (tp + fn_) as f64
    }
}

/// Harmonic mean of precision and recall, 0 when both are 0
pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision == 0.0 && recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// A ground truth box and the confidence of the detection that found it
///
/// Serialized as `[x0, y0, x1, y1, detected_confidence]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "[f32; 5]")]
pub struct GroundTruthRecord {
    pub bbox: BBox,
    /// 0 if no detection matched this box
    pub detected_confidence: f32,
}

impl From<GroundTruthRecord> for [f32; 5] {
    fn from(record: GroundTruthRecord) -> Self {
        let [x0, y0, x1, y1] = record.bbox.to_array();
        [x0, y0, x1, y1, record.detected_confidence]
    }
}

/// Detections of one image matched to its ground truth
///
/// Each ground truth box, in input order, claims the most confident
/// unclaimed detection whose IoU with it is at least `match_iou`. The
/// matching is greedy; it is not a globally optimal assignment.
#[derive(Debug, Clone)]
pub struct MatchSet {
    pub image_name: String,
    pub confidence_threshold: f32,
    pub match_iou: f32,
    /// All detections, most confident first
    detections: Vec<Detection>,
    /// Whether `detections[i]` was claimed by a ground truth box
    claimed: Vec<bool>,
    ground_truth: Vec<GroundTruthRecord>,
}

impl MatchSet {
    pub fn new(
        image_name: impl Into<String>,
        mut detections: Vec<Detection>,
        ground_truth: &[BBox],
        confidence_threshold: f32,
        match_iou: f32,
    ) -> Self {
        sort_by_confidence(&mut detections);
        let mut claimed = vec![false; detections.len()];
        let mut records = Vec::with_capacity(ground_truth.len());

        for gt in ground_truth {
            let found = detections
                .iter()
                .enumerate()
                .find(|(i, d)| !claimed[*i] && gt.iou(&d.bbox) >= match_iou)
                .map(|(i, d)| (i, d.confidence));

            let detected_confidence = match found {
                Some((i, confidence)) => {
                    claimed[i] = true;
                    confidence
                }
                None => 0.0,
            };

            records.push(GroundTruthRecord {
                bbox: *gt,
                detected_confidence,
            });
        }

        Self {
            image_name: image_name.into(),
            confidence_threshold,
            match_iou,
            detections,
            claimed,
            ground_truth: records,
        }
    }

    /// All detections, most confident first
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn ground_truth(&self) -> &[GroundTruthRecord] {
        &self.ground_truth
    }

    /// Ground truth found by a detection above the threshold
    pub fn detected_ground_truth(&self) -> impl Iterator<Item = &GroundTruthRecord> + '_ {
        self.ground_truth
            .iter()
            .filter(move |gt| gt.detected_confidence >= self.confidence_threshold)
    }

    /// Ground truth not found by any detection above the threshold
    pub fn missed_ground_truth(&self) -> impl Iterator<Item = &GroundTruthRecord> + '_ {
        self.ground_truth
            .iter()
            .filter(move |gt| gt.detected_confidence < self.confidence_threshold)
    }

    /// Detections above the threshold that matched ground truth
    pub fn true_detections(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.thresholded(true)
    }

    /// Detections above the threshold that matched nothing
    pub fn false_detections(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.thresholded(false)
    }

    fn thresholded(&self, claimed: bool) -> impl Iterator<Item = &Detection> + '_ {
        self.detections
            .iter()
            .zip(&self.claimed)
            .filter(move |(d, c)| **c == claimed && d.confidence >= self.confidence_threshold)
            .map(|(d, _)| d)
    }

    /// `(confidence, is_true)` for every detection, regardless of threshold
    pub fn confidence_pairs(&self) -> impl Iterator<Item = (f32, bool)> + '_ {
        self.detections
            .iter()
            .zip(&self.claimed)
            .map(|(d, c)| (d.confidence, *c))
    }

    pub fn tp(&self) -> usize {
        self.detected_ground_truth().count()
    }

    pub fn fn_(&self) -> usize {
        self.missed_ground_truth().count()
    }

    pub fn fp(&self) -> usize {
        self.false_detections().count()
    }

    pub fn precision(&self) -> f64 {
        precision(self.tp(), self.fp())
    }

    pub fn recall(&self) -> f64 {
        recall(self.tp(), self.fn_())
    }

    pub fn f1(&self) -> f64 {
        f1(self.precision(), self.recall())
    }
}

#[derive(Serialize)]
struct MatchSetRecord<'a> {
    image_name: &'a str,
    tp: usize,
    #[serde(rename = "fn")]
    fn_: usize,
    fp: usize,
    precision: f64,
    recall: f64,
    f1: f64,
    detections: &'a [Detection],
    ground_truth: &'a [GroundTruthRecord],
}

impl Serialize for MatchSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MatchSetRecord {
            image_name: &self.image_name,
            tp: self.tp(),
            fn_: self.fn_(),
            fp: self.fp(),
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
            detections: &self.detections,
            ground_truth: &self.ground_truth,
        }
        .serialize(serializer)
    }
}

/// Summary of a detector run over a dataset
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub tp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub fp: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Average precision over all detections of all images
    #[serde(rename = "mAP")]
    pub map: f64,
    pub image_count: usize,
    #[serde(rename = "images")]
    pub matchsets: Vec<MatchSet>,
    pub images_path: PathBuf,
    pub detector: String,
    pub confidence_threshold: f32,
    pub match_iou: f32,
}

impl Evaluation {
    pub fn new(
        matchsets: Vec<MatchSet>,
        images_path: impl Into<PathBuf>,
        detector: impl Into<String>,
        confidence_threshold: f32,
        match_iou: f32,
    ) -> Self {
        let tp = matchsets.iter().map(MatchSet::tp).sum();
        let fn_ = matchsets.iter().map(MatchSet::fn_).sum();
        let fp = matchsets.iter().map(MatchSet::fp).sum();

        let pairs: Vec<(f32, bool)> = matchsets
            .iter()
            .flat_map(MatchSet::confidence_pairs)
            .collect();
        let ground_truth_count = matchsets.iter().map(|ms| ms.ground_truth.len()).sum();
        let map = average_precision(&pairs, ground_truth_count);

        let precision = precision(tp, fp);
        let recall = recall(tp, fn_);

        Self {
            tp,
            fn_,
            fp,
            precision,
            recall,
            f1: f1(precision, recall),
            map,
            image_count: matchsets.len(),
            matchsets,
            images_path: images_path.into(),
            detector: detector.into(),
            confidence_threshold,
            match_iou,
        }
    }

    /// Write the evaluation as JSON
    pub fn to_json_file(&self, path: &Path) -> WentralResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| WentralError::OutputError(path.to_path_buf(), e))?;
        info!("Evaluation written to {}", path.display());
        Ok(())
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Overall results:")?;
        writeln!(f, "N: {}", self.image_count)?;
        writeln!(f, "TP:{} FN:{} FP:{}", self.tp, self.fn_, self.fp)?;
        writeln!(f, "Recall: {:.2}%", self.recall * 100.0)?;
        writeln!(f, "Precision: {:.2}%", self.precision * 100.0)?;
        writeln!(f, "F1: {:.2}%", self.f1 * 100.0)?;
        write!(f, "mAP: {:.2}%", self.map * 100.0)
    }
}

/// Run `detector` on every sample and match the results to the ground truth
///
/// `params` go to the detector as they are; usually they leave the
/// thresholds unset so that the detector reports everything it is configured
/// to and `confidence_threshold` is applied by the match sets. Iteration
/// stops at the first error.
pub fn match_detections<'a, D, I>(
    samples: I,
    detector: &'a D,
    params: DetectParams,
    confidence_threshold: f32,
    match_iou: f32,
) -> impl Iterator<Item = WentralResult<MatchSet>> + 'a
where
    D: Detector + ?Sized,
    I: IntoIterator<Item = Result<Sample, DatasetError>>,
    I::IntoIter: 'a,
{
    samples.into_iter().map(move |sample| {
        let sample = sample?;
        info!("Processing image: {}", sample.path);
        debug!("Ground truth: {:?}", sample.ground_truth);

        let detections = detector.detect(&sample.image, &sample.path, &params)?;
        debug!("Detections: {:?}", detections);

        let matchset = MatchSet::new(
            image_name(&sample.path),
            detections,
            &sample.ground_truth,
            confidence_threshold,
            match_iou,
        );
        info!(
            "TP:{} FN:{} FP:{} Recall:{:.2}% Precision:{:.2}%",
            matchset.tp(),
            matchset.fn_(),
            matchset.fp(),
            matchset.recall() * 100.0,
            matchset.precision() * 100.0
        );

        Ok(matchset)
    })
}

/// Evaluate `detector` on every image of `dataset`
///
/// Fails on the first image that can't be loaded or processed.
pub fn evaluate<D: Detector + ?Sized>(
    dataset: &JsonDataset,
    detector: &D,
    params: DetectParams,
    confidence_threshold: f32,
    match_iou: f32,
) -> WentralResult<Evaluation> {
    info!("Evaluating {} on {}", detector, dataset);

    let matchsets = match_detections(
        dataset.samples(),
        detector,
        params,
        confidence_threshold,
        match_iou,
    )
    .collect::<WentralResult<Vec<_>>>()?;

    Ok(Evaluation::new(
        matchsets,
        dataset.images_path(),
        detector.to_string(),
        confidence_threshold,
        match_iou,
    ))
}
