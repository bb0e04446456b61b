//! Axis-aligned box geometry
//!
//! Boxes are `(x0, y0, x1, y1)` with `x0 <= x1` and `y0 <= y1`. The ordering
//! is not validated: a pair of boxes whose intersection would be inverted is
//! simply treated as non-overlapping.

use super::detection::DetectionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Added to a possibly zero-valued denominator to avoid division by zero.
pub const EPSILON: f32 = 1e-7;

/// An axis-aligned rectangle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 4]")]
pub struct BBox {
    /// Left X coordinate
    pub x0: f32,
    /// Top Y coordinate
    pub y0: f32,
    /// Right X coordinate
    pub x1: f32,
    /// Bottom Y coordinate
    pub y1: f32,
}

impl BBox {
    /// Create a new box
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Area of the box
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection with another box, `None` if they don't overlap
    ///
    /// Boxes that only touch along an edge intersect in a zero-area box,
    /// which is still `Some`.
    pub fn intersect(&self, other: &BBox) -> Option<BBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);

        if x0 > x1 || y0 > y1 {
            return None;
        }

        Some(BBox::new(x0, y0, x1, y1))
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BBox) -> f32 {
        let intersection = area(self.intersect(other).as_ref());
        intersection / (self.area() + other.area() - intersection + EPSILON)
    }

    /// Translate the box by `(dx, dy)`
    pub fn offset(&self, dx: f32, dy: f32) -> BBox {
        BBox::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

impl From<[f32; 4]> for BBox {
    fn from([x0, y0, x1, y1]: [f32; 4]) -> Self {
        Self::new(x0, y0, x1, y1)
    }
}

impl From<BBox> for [f32; 4] {
    fn from(bbox: BBox) -> Self {
        bbox.to_array()
    }
}

/// Wire format accepts trailing values (e.g. a recorded confidence) and
/// ignores them.
impl TryFrom<Vec<f32>> for BBox {
    type Error = DetectionError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [x0, y0, x1, y1, ..] => Ok(BBox::new(*x0, *y0, *x1, *y1)),
            _ => Err(DetectionError::InvalidBoundingBox {
                expected: 4,
                found: values.len(),
            }),
        }
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}-{},{}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Area of an optional box, zero for `None`
pub fn area(bbox: Option<&BBox>) -> f32 {
    bbox.map_or(0.0, BBox::area)
}

pub fn intersect(a: &BBox, b: &BBox) -> Option<BBox> {
    a.intersect(b)
}

pub fn iou(a: &BBox, b: &BBox) -> f32 {
    a.iou(b)
}

/// Smallest box that contains all of `boxes`, `None` if there are none
pub fn bounding_box<'a, I>(boxes: I) -> Option<BBox>
where
    I: IntoIterator<Item = &'a BBox>,
{
    boxes.into_iter().fold(None, |acc, b| {
        Some(match acc {
            None => *b,
            Some(acc) => BBox::new(
                acc.x0.min(b.x0),
                acc.y0.min(b.y0),
                acc.x1.max(b.x1),
                acc.y1.max(b.y1),
            ),
        })
    })
}

/// Transposition of x and y coordinates
///
/// Implementors swap the coordinate pairs of their box and keep every other
/// field as it is. Wide images are sliced by transposing them into tall ones.
pub trait XySwap {
    fn xy_swap(&self) -> Self;
}

impl XySwap for BBox {
    fn xy_swap(&self) -> Self {
        BBox::new(self.y0, self.x0, self.y1, self.x1)
    }
}
