// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UV triangles and their classification.

use crate::math::Vec2;

/// The winding order of a triangle in UV space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winding {
    /// Counter-clockwise (positive signed area).
    Ccw,
    /// Clockwise (negative signed area).
    Cw,
}

/// A triangle in normalized texture space, with a cached bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    /// The first vertex.
    pub p0: Vec2,
    /// The second vertex.
    pub p1: Vec2,
    /// The third vertex.
    pub p2: Vec2,
    /// The minimum corner of the bounding box.
    pub aabb_min: Vec2,
    /// The maximum corner of the bounding box.
    pub aabb_max: Vec2,
}

impl Triangle {
    /// Create a new triangle and compute its bounding box.
    pub fn new(p0: Vec2, p1: Vec2, p2: Vec2) -> Self {
        Self {
            p0,
            p1,
            p2,
            aabb_min: p0.min(p1).min(p2),
            aabb_max: p0.max(p1).max(p2),
        }
    }

    /// The signed doubled area of the triangle.
    ///
    /// Positive for counter-clockwise winding.
    #[inline]
    pub fn signed_double_area(&self) -> f32 {
        (self.p2 - self.p0).cross(self.p1 - self.p0)
    }

    /// The (unsigned) area of the triangle.
    #[inline]
    pub fn area(&self) -> f32 {
        0.5 * self.signed_double_area().abs()
    }

    /// The winding order of the triangle.
    #[inline]
    pub fn winding(&self) -> Winding {
        if self.signed_double_area() > 0. {
            Winding::Ccw
        } else {
            Winding::Cw
        }
    }

    /// Whether the triangle is unusable for baking.
    ///
    /// A triangle is degenerate if any vertex is NaN or infinite, or if its area
    /// vanishes (squared doubled area below `1e-9`).
    pub fn is_degenerate(&self) -> bool {
        if !(self.p0.is_finite() && self.p1.is_finite() && self.p2.is_finite()) {
            return true;
        }
        let n = self.signed_double_area();
        n * n < 1e-9
    }

    /// Interpolate a barycentric coordinate pair into the triangle.
    ///
    /// `(0, 0)` maps to `p0`, `(1, 0)` to `p1` and `(0, 1)` to `p2`.
    #[inline]
    pub fn interpolate(&self, bary: Vec2) -> Vec2 {
        self.p0 * (1. - bary.x - bary.y) + self.p1 * bary.x + self.p2 * bary.y
    }

    /// The centroid of the triangle.
    #[inline]
    pub fn centroid(&self) -> Vec2 {
        (self.p0 + self.p1 + self.p2) * (1. / 3.)
    }
}
