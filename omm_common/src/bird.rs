// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bird-curve enumeration of micro-triangles.
//!
//! Subdividing a triangle `level` times produces `4^level` micro-triangles. The
//! opacity micromap format stores their states in a fixed hierarchical
//! space-filling order (the "bird curve"); this module maps a position along
//! that curve to the micro-triangle it denotes.

use crate::geometry::Triangle;
use crate::math::Vec2;

/// The largest supported subdivision level.
pub const MAX_SUBDIVISION_LEVEL: u32 = 12;

/// The number of distinct subdivision levels, including level 0.
pub const SUBDIVISION_LEVEL_COUNT: usize = (MAX_SUBDIVISION_LEVEL + 1) as usize;

/// The number of micro-triangles at a subdivision level.
#[inline]
pub const fn micro_triangle_count(level: u32) -> u32 {
    1 << (level << 1)
}

/// Gather the even-positioned bits of `x` into the low half.
#[inline]
const fn extract_even_bits(x: u32) -> u32 {
    let mut x = x & 0x5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF;
    x
}

/// Exclusive prefix XOR of the bits of `x`, from high to low.
#[inline]
const fn prefix_eor(x: u32) -> u32 {
    let mut x = x;
    x ^= x >> 1;
    x ^= x >> 2;
    x ^= x >> 4;
    x ^= x >> 8;
    x
}

/// Convert a distance along the bird curve to discrete barycentric coordinates.
#[inline]
const fn index_to_discrete_bary(index: u32) -> (u32, u32, u32) {
    let b0 = extract_even_bits(index);
    let b1 = extract_even_bits(index >> 1);

    // Per-iteration flip flags of the curve.
    let fx = prefix_eor(b0);
    let fy = prefix_eor(b0 & !b1);
    let t = fy ^ b1;

    let u = (fx & !t) | (b0 & !t) | (!b0 & !fx & t);
    let v = fy ^ b0;
    let w = (!fx & !t) | (b0 & !t) | (!b0 & fx & t);
    (u, v, w)
}

/// The barycentric corners of the micro-triangle at `index` within the unit
/// triangle `(0,0), (1,0), (0,1)`.
pub fn index_to_bary(index: u32, level: u32) -> (Vec2, Vec2, Vec2) {
    if level == 0 {
        return (Vec2::ZERO, Vec2::new(1., 0.), Vec2::new(0., 1.));
    }

    let (u, v, w) = index_to_discrete_bary(index);
    let mask = (1_u32 << level) - 1;
    let (u, v, w) = (u & mask, v & mask, w & mask);

    // Odd coordinate sums denote an upward-pointing micro-triangle, even sums a
    // downward-pointing one anchored at its opposite corner.
    let upright = (u ^ v ^ w) & 1 == 1;
    let (u, v) = if upright { (u, v) } else { (u + 1, v + 1) };

    let scale = 1. / (1_u32 << level) as f32;
    let base = Vec2::new(u as f32 * scale, v as f32 * scale);
    let sign = if upright { scale } else { -scale };
    (
        base,
        base + Vec2::new(sign, 0.),
        base + Vec2::new(0., sign),
    )
}

/// The micro-triangle at `index` of the subdivision of `tri` at `level`.
pub fn micro_triangle(tri: &Triangle, index: u32, level: u32) -> Triangle {
    debug_assert!(level <= MAX_SUBDIVISION_LEVEL);
    debug_assert!(index < micro_triangle_count(level));
    let (b0, b1, b2) = index_to_bary(index, level);
    Triangle::new(
        tri.interpolate(b0),
        tri.interpolate(b1),
        tri.interpolate(b2),
    )
}
