//! Box geometry and per-image containers.
//!
//! Boxes are axis-aligned `[x0, y0, x1, y1]` rectangles in absolute pixel
//! coordinates of the image they belong to.

pub mod instances;
pub mod ragged;

/// Axis-aligned box as `[x0, y0, x1, y1]`.
pub type BoxCoords = [f32; 4];

/// Size of an input image in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
}

impl ImageSize {
    /// Creates an image size from width and height.
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Area of a box; degenerate boxes have zero area.
pub fn box_area(b: &BoxCoords) -> f32 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// Intersection over union of two boxes. Returns 0 when the union is empty.
pub fn box_iou(a: &BoxCoords, b: &BoxCoords) -> f32 {
    let iw = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let ih = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = iw * ih;
    let union = box_area(a) + box_area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Clips a box to `[0, width] x [0, height]`.
pub fn clip_box(b: &BoxCoords, size: ImageSize) -> BoxCoords {
    [
        b[0].clamp(0.0, size.width.max(0.0)),
        b[1].clamp(0.0, size.height.max(0.0)),
        b[2].clamp(0.0, size.width.max(0.0)),
        b[3].clamp(0.0, size.height.max(0.0)),
    ]
}

/// Returns true when every coordinate is finite.
pub fn is_finite_box(b: &BoxCoords) -> bool {
    b.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::{box_area, box_iou, clip_box, ImageSize};

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [1.0, 2.0, 5.0, 6.0];
        assert!((box_iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = [0.0, 0.0, 2.0, 2.0];
        let b = [1.0, 0.0, 3.0, 2.0];
        assert!((box_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(box_iou(&a, &[5.0, 5.0, 6.0, 6.0]), 0.0);
    }

    #[test]
    fn degenerate_boxes_have_zero_area_and_iou() {
        let flat = [1.0, 1.0, 1.0, 4.0];
        assert_eq!(box_area(&flat), 0.0);
        assert_eq!(box_iou(&flat, &flat), 0.0);
    }

    #[test]
    fn clip_keeps_box_inside_image() {
        let clipped = clip_box(&[-3.0, 2.0, 120.0, 90.0], ImageSize::new(100.0, 80.0));
        assert_eq!(clipped, [0.0, 2.0, 100.0, 80.0]);
    }
}
