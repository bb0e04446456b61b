//! Slice layout for non-square images
//!
//! A tall image is covered by square slices whose side is the image width;
//! consecutive slices overlap by at least `slice_overlap` of their area.
//! Wide images are transposed, sliced as tall ones and transposed back.

use crate::utils::{BBox, XySwap};

/// Slice boxes covering an image of `image_size = (width, height)`
///
/// If the short side over the long side is at least `slicing_threshold` the
/// image is close enough to square and a single box covering all of it is
/// returned. Otherwise the long side is cut into square slices whose starts
/// are evenly spaced, with the last slice ending exactly at the image edge.
pub fn slice_boxes(
    image_size: (u32, u32),
    slicing_threshold: f64,
    slice_overlap: f64,
) -> Vec<BBox> {
    let (width, height) = image_size;

    if f64::from(width) * slicing_threshold > f64::from(height) {
        return slice_boxes((height, width), slicing_threshold, slice_overlap)
            .iter()
            .map(XySwap::xy_swap)
            .collect();
    }

    if f64::from(height) * slicing_threshold <= f64::from(width) || width == 0 {
        return vec![BBox::new(0.0, 0.0, width as f32, height as f32)];
    }

    vertical_slices(width, height, slice_overlap)
        .into_iter()
        .map(|start| BBox::new(0.0, start as f32, width as f32, (start + width) as f32))
        .collect()
}

/// Starts of square slices of side `width` along a column of `height`
fn vertical_slices(width: u32, height: u32, overlap: f64) -> Vec<u32> {
    let overlap_pixels = ((f64::from(width) * overlap) as u32).min(width - 1);
    let count = (f64::from(height - overlap_pixels) / f64::from(width - overlap_pixels)).ceil()
        as usize;
    let count = count.max(2);
    let step = f64::from(height.saturating_sub(width)) / (count - 1) as f64;

    let mut starts: Vec<u32> = (0..count).map(|i| (step * i as f64) as u32).collect();
    // Correct for rounding.
    if let Some(last) = starts.last_mut() {
        *last = height.saturating_sub(width);
    }

    starts
}
