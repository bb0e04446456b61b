//! Combining detections from overlapping slices
//!
//! Detections of the same object found in two adjacent slices are merged
//! when their parts inside the region shared by both slices overlap enough.
//! The "same object" relation is closed transitively, so each connected
//! group of detections becomes one detection: the bounding box of the group
//! with the highest confidence of its members.

use crate::utils::{bounding_box, sort_by_confidence, BBox, Detection};
use tracing::debug;

/// Convert a detection relative to `slice` into image coordinates
pub fn to_absolute(detection: &Detection, slice: &BBox) -> Detection {
    detection.offset(slice.x0, slice.y0)
}

/// Part of an image-level detection that lies inside `slice`, in slice
/// coordinates
///
/// `None` when the detection covers no area of the slice.
pub fn to_relative(detection: &Detection, slice: &BBox) -> Option<Detection> {
    let clipped = detection
        .bbox
        .intersect(slice)
        .filter(|b| b.width() > 0.0 && b.height() > 0.0)?;

    Some(Detection::from_bbox(
        clipped.offset(-slice.x0, -slice.y0),
        detection.confidence,
    ))
}

/// Combine a group of detections into one
///
/// Returns `None` for an empty group.
pub fn combine_cluster<'a, I>(cluster: I) -> Option<Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let members: Vec<&Detection> = cluster.into_iter().collect();
    let bbox = bounding_box(members.iter().map(|d| &d.bbox))?;
    let confidence = members
        .iter()
        .map(|d| d.confidence)
        .fold(f32::NEG_INFINITY, f32::max);

    Some(Detection::from_bbox(bbox, confidence))
}

/// Combine the detections of two slices
///
/// All detections of both sides are returned, with every connected group of
/// overlapping detections replaced by its combination. Two detections from
/// different sides overlap when the IoU of their parts inside
/// `box_a ∩ box_b` is at least `iou_threshold`. If the slices don't
/// intersect nothing is combined.
pub fn combine_pair(
    box_a: &BBox,
    dets_a: &[Detection],
    box_b: &BBox,
    dets_b: &[Detection],
    iou_threshold: f32,
) -> Vec<Detection> {
    let Some(shared) = box_a.intersect(box_b) else {
        return dets_a.iter().chain(dets_b).copied().collect();
    };

    let mut side_a = dets_a.to_vec();
    let mut side_b = dets_b.to_vec();
    sort_by_confidence(&mut side_a);
    sort_by_confidence(&mut side_b);

    let clipped_a: Vec<Option<BBox>> = side_a.iter().map(|d| d.bbox.intersect(&shared)).collect();
    let clipped_b: Vec<Option<BBox>> = side_b.iter().map(|d| d.bbox.intersect(&shared)).collect();

    let offset = side_a.len();
    let mut clusters = DisjointSet::new(side_a.len() + side_b.len());

    for (i, a) in clipped_a.iter().enumerate() {
        let Some(a) = a else { continue };
        for (j, b) in clipped_b.iter().enumerate() {
            let Some(b) = b else { continue };
            if a.iou(b) >= iou_threshold {
                clusters.union(i, offset + j);
            }
        }
    }

    let all: Vec<Detection> = side_a.into_iter().chain(side_b).collect();
    let groups = clusters.groups();
    debug!(
        "Combined {} detections into {} across {}",
        all.len(),
        groups.len(),
        shared
    );

    groups
        .iter()
        .filter_map(|members| combine_cluster(members.iter().map(|&i| &all[i])))
        .collect()
}

/// Combine the detections of all slices of one image
///
/// `slice_boxes` must be in their geometric order and `slice_detections[i]`
/// holds the detections of slice `i` relative to that slice. Detections are
/// carried from one slice to the next only while they intersect the next
/// slice; the others are final.
pub fn combine_sequence(
    slice_boxes: &[BBox],
    slice_detections: &[Vec<Detection>],
    iou_threshold: f32,
) -> Vec<Detection> {
    debug_assert_eq!(slice_boxes.len(), slice_detections.len());

    let mut slices = slice_boxes.iter().zip(slice_detections);
    let Some((first_box, first_detections)) = slices.next() else {
        return Vec::new();
    };

    let mut finished = Vec::new();
    let mut last_box = *first_box;
    let mut active: Vec<Detection> = first_detections
        .iter()
        .map(|d| to_absolute(d, first_box))
        .collect();

    for (slice, detections) in slices {
        let detections: Vec<Detection> = detections.iter().map(|d| to_absolute(d, slice)).collect();
        let (carried, done): (Vec<Detection>, Vec<Detection>) = active
            .into_iter()
            .partition(|d| d.bbox.intersect(slice).is_some());

        finished.extend(done);
        active = combine_pair(&last_box, &carried, slice, &detections, iou_threshold);
        last_box = *slice;
    }

    finished.extend(active);
    finished
}

/// Union-find over `0..n` with path compression
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[i] != root {
            let next = self.parent[i];
            self.parent[i] = root;
            i = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }

    /// Members of every set, ordered by their smallest element
    fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for i in 0..n {
            let root = self.find(i);
            let index = *slot[root].get_or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[index].push(i);
        }

        groups
    }
}
