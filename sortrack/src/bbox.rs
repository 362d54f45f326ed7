//! Bounding box operations and IoU calculations

use ndarray::prelude::*;
use std::fmt;

/// Axis-aligned bounding box in center form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl Bbox {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Convert to measurement form [cx, cy, area, aspect_ratio].
    pub fn to_z(&self) -> [f32; 4] {
        [self.cx, self.cy, self.w * self.h, self.w / self.h]
    }

    /// Recover a box from measurement form [cx, cy, s, r].
    ///
    /// `w = sqrt(s * r)`, `h = s / w`. A collapsed or negative area yields
    /// non-finite extents; the tracker retires such filters.
    pub fn from_z(z: &[f32; 4]) -> Self {
        let w = (z[2] * z[3]).sqrt();
        let h = z[2] / w;
        Self {
            cx: z[0],
            cy: z[1],
            w,
            h,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.w.is_finite() && self.h.is_finite()
    }

    /// Integer pixel rectangle (x, y, w, h), truncated toward zero.
    fn pixel_rect(&self) -> (i32, i32, i32, i32) {
        (
            (self.cx - self.w / 2.0) as i32,
            (self.cy - self.h / 2.0) as i32,
            self.w as i32,
            self.h as i32,
        )
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bbox({}, {}, {}x{})", self.cx, self.cy, self.w, self.h)
    }
}

/// IoU of two boxes over their integer pixel rectangles.
pub fn iou(a: &Bbox, b: &Bbox) -> f32 {
    let (ax, ay, aw, ah) = a.pixel_rect();
    let (bx, by, bw, bh) = b.pixel_rect();

    let iw = ((ax + aw).min(bx + bw) - ax.max(bx)).max(0);
    let ih = ((ay + ah).min(by + bh) - ay.max(by)).max(0);
    let intersection = (iw * ih) as f32;
    let union = (aw * ah + bw * bh) as f32 - intersection;

    intersection / (union + f32::EPSILON)
}

/// Pairwise IoU, shape (m, n) for m detections against n predictions.
pub fn iou_matrix(detections: &[Bbox], predictions: &[Bbox]) -> Array2<f32> {
    Array2::from_shape_fn((detections.len(), predictions.len()), |(i, j)| {
        iou(&detections[i], &predictions[j])
    })
}
