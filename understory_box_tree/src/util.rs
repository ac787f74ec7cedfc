// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversions between Kurbo geometry and index boxes, plus shared box math.

use kurbo::{Point, Rect};
use understory_index::Aabb2D;

/// Box covering `r`. The rectangle is expected to be normalized (`x0 <= x1`, `y0 <= y1`).
pub fn rect_to_aabb(r: Rect) -> Aabb2D<f64> {
    Aabb2D::new(r.x0, r.y0, r.x1, r.y1)
}

/// Rectangle covering `b`.
pub fn aabb_to_rect(b: Aabb2D<f64>) -> Rect {
    Rect::new(b.min_x, b.min_y, b.max_x, b.max_y)
}

/// Squared distance from `p` to the closest point of `b`, zero when inside.
pub(crate) fn distance_squared(b: &Aabb2D<f64>, p: Point) -> f64 {
    let mut total = 0.0;
    if p.x < b.min_x {
        let d = b.min_x - p.x;
        total += d * d;
    } else if p.x > b.max_x {
        let d = p.x - b.max_x;
        total += d * d;
    }
    if p.y < b.min_y {
        let d = b.min_y - p.y;
        total += d * d;
    } else if p.y > b.max_y {
        let d = p.y - b.max_y;
        total += d * d;
    }
    total
}

/// Perimeter-like size of a box: width plus height.
#[inline]
pub(crate) fn half_perimeter(b: &Aabb2D<f64>) -> f64 {
    (b.max_x - b.min_x) + (b.max_y - b.min_y)
}
