//! Integer pixel bounding boxes in XYXY format.

use serde::{Deserialize, Serialize};

/// An axis-aligned box in absolute pixel coordinates (xmin, ymin, xmax, ymax).
///
/// Construction does not enforce `min < max`. Readers of noisy external
/// formats build boxes first and decide afterwards whether to keep them, so
/// an invalid box must be representable. See [`BBox::is_valid`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BBox {
    /// Creates a new box from explicit coordinates.
    #[inline]
    pub fn new(x_min: i64, y_min: i64, x_max: i64, y_max: i64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Converts from XYWH (top-left corner plus size).
    ///
    /// Each corner is truncated toward zero, not rounded. This is the COCO
    /// convention: `[10.7, 3.2, 5.0, 5.0]` becomes `(10, 3, 15, 8)`.
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(
            x.trunc() as i64,
            y.trunc() as i64,
            (x + width).trunc() as i64,
            (y + height).trunc() as i64,
        )
    }

    /// Converts normalized `[0, 1]` coordinates to pixels, rounding to the
    /// nearest integer.
    pub fn from_normalized(
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let w = f64::from(image_width);
        let h = f64::from(image_height);
        Self::new(
            (x_min * w).round() as i64,
            (y_min * h).round() as i64,
            (x_max * w).round() as i64,
            (y_max * h).round() as i64,
        )
    }

    /// Returns `(x, y, width, height)`.
    #[inline]
    pub fn to_xywh(&self) -> (i64, i64, i64, i64) {
        (self.x_min, self.y_min, self.width(), self.height())
    }

    /// May be negative if the box is malformed.
    #[inline]
    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    /// May be negative if the box is malformed.
    #[inline]
    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// True when `x_min < x_max` and `y_min < y_max`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x_min < self.x_max && self.y_min < self.y_max
    }

    /// The smallest box enclosing both `self` and `other`.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.x_min.min(other.x_min),
            self.y_min.min(other.y_min),
            self.x_max.max(other.x_max),
            self.y_max.max(other.y_max),
        )
    }

    /// True when the box shares a non-empty area with a `width x height` frame.
    pub fn overlaps_frame(&self, width: u32, height: u32) -> bool {
        let (w, h) = (i64::from(width), i64::from(height));
        self.is_valid() && self.x_min < w && self.y_min < h && self.x_max > 0 && self.y_max > 0
    }

    /// True when the box lies entirely inside a `width x height` frame.
    pub fn is_inside_frame(&self, width: u32, height: u32) -> bool {
        self.x_min >= 0
            && self.y_min >= 0
            && self.x_max <= i64::from(width)
            && self.y_max <= i64::from(height)
    }

    /// Clamps every coordinate into `[0, width] x [0, height]`.
    pub fn clamp_to_frame(&self, width: u32, height: u32) -> BBox {
        let (w, h) = (i64::from(width), i64::from(height));
        BBox::new(
            self.x_min.clamp(0, w),
            self.y_min.clamp(0, h),
            self.x_max.clamp(0, w),
            self.y_max.clamp(0, h),
        )
    }
}
