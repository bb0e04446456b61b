//! Precision-recall curve and average precision
//!
//! The curve is built from pooled `(confidence, is_true)` pairs of every
//! detection in a dataset. Each point holds the precision and recall that
//! would be obtained with the confidence threshold set to the point's
//! confidence.

use super::{precision, recall};
use std::cmp::Ordering;

/// One point of a precision-recall curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrPoint {
    pub confidence: f64,
    pub precision: f64,
    pub recall: f64,
}

impl PrPoint {
    pub const fn new(confidence: f64, precision: f64, recall: f64) -> Self {
        Self {
            confidence,
            precision,
            recall,
        }
    }
}

/// Precision-recall curve for `detections` and `ground_truth_count` objects
///
/// Points are ordered by decreasing confidence. Detections with equal
/// confidence produce a single point. The curve starts at `(1, 1, 0)` and
/// ends at `(0, 0, 1)`.
pub fn precision_recall_curve(detections: &[(f32, bool)], ground_truth_count: usize) -> Vec<PrPoint> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let mut curve = vec![PrPoint::new(1.0, 1.0, 0.0)];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut last_confidence: Option<f32> = None;

    let point = |confidence: f32, tp: usize, fp: usize| {
        let fn_ = ground_truth_count.saturating_sub(tp);
        PrPoint::new(f64::from(confidence), precision(tp, fp), recall(tp, fn_))
    };

    for (confidence, is_true) in sorted {
        if let Some(last) = last_confidence {
            if confidence < last {
                curve.push(point(last, tp, fp));
            }
        }

        if is_true {
            tp += 1;
        } else {
            fp += 1;
        }
        last_confidence = Some(confidence);
    }

    if let Some(last) = last_confidence {
        curve.push(point(last, tp, fp));
    }

    curve.push(PrPoint::new(0.0, 0.0, 1.0));
    curve
}

/// Replace each precision with the best precision at the same or higher recall
pub fn interpolate(curve: &[PrPoint]) -> Vec<PrPoint> {
    let mut interpolated = curve.to_vec();
    let mut best = 0.0f64;

    for point in interpolated.iter_mut().rev() {
        best = best.max(point.precision);
        point.precision = best;
    }

    interpolated
}

/// Area under the curve, by trapezoids over recall
pub fn area_under_curve(curve: &[PrPoint]) -> f64 {
    curve
        .windows(2)
        .map(|pair| (pair[1].precision + pair[0].precision) / 2.0 * (pair[1].recall - pair[0].recall))
        .sum()
}

/// Average precision: area under the interpolated precision-recall curve
pub fn average_precision(detections: &[(f32, bool)], ground_truth_count: usize) -> f64 {
    let curve = precision_recall_curve(detections, ground_truth_count);
    area_under_curve(&interpolate(&curve))
}
