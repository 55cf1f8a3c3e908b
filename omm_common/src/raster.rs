// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serial conservative rasterization.
//!
//! Coverage kernels need every grid cell a triangle touches, even partially, so
//! rasterization here is an exact overlap test (separating axes) over the
//! triangle's bounding box rather than a sampling scan. Cells are visited row
//! by row, left to right, so kernel side effects are deterministic.

use crate::geometry::Triangle;
use crate::math::{IVec2, Vec2};
use smallvec::SmallVec;

// Cell coordinates are clamped to this range before the scan; it is far beyond
// any addressable texture but keeps the +1 cell arithmetic away from i32 edges.
const MAX_CELL_COORD: f32 = (1_i64 << 30) as f32;

/// Visit every cell of a `grid_size` raster that `tri` touches.
///
/// The triangle is given in normalized UV space and scaled by `grid_size`
/// before scanning; `pixel_offset` is applied after the scale (bilinear kernels
/// pass `(-0.5, -0.5)` so raster cells coincide with interpolation cells).
/// Visited cells may lie outside `[0, grid_size)`; the caller's address mode
/// decides what they mean.
pub fn rasterize_conservative<F: FnMut(IVec2)>(
    tri: &Triangle,
    grid_size: IVec2,
    pixel_offset: Vec2,
    mut visit: F,
) {
    let scale = grid_size.as_vec2();
    let p = [
        tri.p0 * scale + pixel_offset,
        tri.p1 * scale + pixel_offset,
        tri.p2 * scale + pixel_offset,
    ];

    let lo = p[0].min(p[1]).min(p[2]);
    let hi = p[0].max(p[1]).max(p[2]);
    let x0 = lo.x.clamp(-MAX_CELL_COORD, MAX_CELL_COORD).floor() as i32;
    let y0 = lo.y.clamp(-MAX_CELL_COORD, MAX_CELL_COORD).floor() as i32;
    let x1 = hi.x.clamp(-MAX_CELL_COORD, MAX_CELL_COORD).floor() as i32;
    let y1 = hi.y.clamp(-MAX_CELL_COORD, MAX_CELL_COORD).floor() as i32;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let cell_min = Vec2::new(x as f32, y as f32);
            if triangle_overlaps_cell(&p, cell_min, cell_min + Vec2::splat(1.)) {
                visit(IVec2::new(x, y));
            }
        }
    }
}

/// Exact triangle/rectangle overlap test; touching counts as overlap.
fn triangle_overlaps_cell(p: &[Vec2; 3], cell_min: Vec2, cell_max: Vec2) -> bool {
    // The box axes were already separated against the triangle AABB by the scan
    // bounds, except for the cell's own extents.
    let lo = p[0].min(p[1]).min(p[2]);
    let hi = p[0].max(p[1]).max(p[2]);
    if hi.x < cell_min.x || lo.x > cell_max.x || hi.y < cell_min.y || lo.y > cell_max.y {
        return false;
    }

    let corners = [
        cell_min,
        Vec2::new(cell_max.x, cell_min.y),
        Vec2::new(cell_min.x, cell_max.y),
        cell_max,
    ];
    for i in 0..3 {
        let a = p[i];
        let b = p[(i + 1) % 3];
        let c = p[(i + 2) % 3];
        let mut n = Vec2::new(a.y - b.y, b.x - a.x);
        // Orient the edge normal toward the triangle interior.
        if n.dot(c - a) < 0. {
            n = -n;
        }
        if corners.iter().all(|&q| n.dot(q - a) < 0.) {
            return false;
        }
    }
    true
}

/// Clip a triangle to the unit cell anchored at `cell`, in cell-local coordinates.
///
/// Returns the clipped convex polygon; empty when the triangle misses the cell.
pub fn clip_triangle_to_cell(p: &[Vec2; 3], cell: IVec2) -> SmallVec<[Vec2; 8]> {
    let offset = cell.as_vec2();
    let mut poly: SmallVec<[Vec2; 8]> = p.iter().map(|&q| q - offset).collect();

    // Sutherland-Hodgman against the four halfplanes of [0, 1]^2.
    let planes: [(Vec2, f32); 4] = [
        (Vec2::new(1., 0.), 0.),
        (Vec2::new(-1., 0.), -1.),
        (Vec2::new(0., 1.), 0.),
        (Vec2::new(0., -1.), -1.),
    ];
    let mut next: SmallVec<[Vec2; 8]> = SmallVec::new();
    for (n, d) in planes {
        next.clear();
        for i in 0..poly.len() {
            let a = poly[i];
            let b = poly[(i + 1) % poly.len()];
            let da = n.dot(a) - d;
            let db = n.dot(b) - d;
            if da >= 0. {
                next.push(a);
            }
            if (da < 0.) != (db < 0.) {
                let t = da / (da - db);
                next.push(a + (b - a) * t);
            }
        }
        core::mem::swap(&mut poly, &mut next);
        if poly.is_empty() {
            break;
        }
    }
    poly
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Triangle;

    fn cover(tri: &Triangle, grid: IVec2, offset: Vec2) -> Vec<IVec2> {
        let mut cells = Vec::new();
        rasterize_conservative(tri, grid, offset, |c| cells.push(c));
        cells
    }

    #[test]
    fn half_square_coverage() {
        // The lower-left half of a 4x4 grid. 13 cells overlap the interior and
        // the vertices at (4, 0) and (0, 4) graze one further cell each.
        let tri = Triangle::new(Vec2::ZERO, Vec2::new(1., 0.), Vec2::new(0., 1.));
        let cells = cover(&tri, IVec2::new(4, 4), Vec2::ZERO);
        assert_eq!(cells.len(), 15);
        for c in &cells {
            assert!(c.x + c.y <= 4, "cell {c:?} is fully outside");
        }
    }

    #[test]
    fn tiny_triangle_still_covers_a_cell() {
        let tri = Triangle::new(
            Vec2::new(0.26, 0.26),
            Vec2::new(0.27, 0.26),
            Vec2::new(0.26, 0.27),
        );
        let cells = cover(&tri, IVec2::new(4, 4), Vec2::ZERO);
        assert_eq!(cells, [IVec2::new(1, 1)]);
    }

    #[test]
    fn offset_shifts_cells() {
        let tri = Triangle::new(
            Vec2::new(0.1, 0.1),
            Vec2::new(0.2, 0.1),
            Vec2::new(0.1, 0.2),
        );
        let plain = cover(&tri, IVec2::new(4, 4), Vec2::ZERO);
        assert_eq!(plain, [IVec2::new(0, 0)]);
        // Shifting by half a cell straddles the triangle across four cells.
        let shifted = cover(&tri, IVec2::new(4, 4), Vec2::splat(-0.5));
        assert_eq!(
            shifted,
            [
                IVec2::new(-1, -1),
                IVec2::new(0, -1),
                IVec2::new(-1, 0),
                IVec2::new(0, 0),
            ]
        );
    }

    #[test]
    fn negative_uvs_visit_negative_cells() {
        let tri = Triangle::new(
            Vec2::new(-0.4, 0.1),
            Vec2::new(-0.3, 0.1),
            Vec2::new(-0.4, 0.2),
        );
        let cells = cover(&tri, IVec2::new(4, 4), Vec2::ZERO);
        assert_eq!(cells, [IVec2::new(-2, 0)]);
    }

    #[test]
    fn coverage_is_conservative() {
        // Every cell containing an interior sample point must be enumerated.
        let tri = Triangle::new(
            Vec2::new(0.13, 0.07),
            Vec2::new(0.93, 0.41),
            Vec2::new(0.27, 0.89),
        );
        let grid = IVec2::new(8, 8);
        let cells = cover(&tri, grid, Vec2::ZERO);

        let inside = |q: Vec2| {
            let p = [tri.p0 * 8., tri.p1 * 8., tri.p2 * 8.];
            (0..3).all(|i| {
                let a = p[i];
                let b = p[(i + 1) % 3];
                let c = p[(i + 2) % 3];
                let n = Vec2::new(a.y - b.y, b.x - a.x);
                let s = n.dot(c - a).signum();
                n.dot(q - a) * s >= 0.
            })
        };
        for yi in 0..80 {
            for xi in 0..80 {
                let q = Vec2::new(xi as f32 * 0.1 + 0.05, yi as f32 * 0.1 + 0.05);
                if inside(q) {
                    let cell = IVec2::new(q.x.floor() as i32, q.y.floor() as i32);
                    assert!(cells.contains(&cell), "missing cell {cell:?}");
                }
            }
        }
    }

    #[test]
    fn clip_interior_cell_is_identity() {
        let p = [Vec2::new(-3., -3.), Vec2::new(9., -3.), Vec2::new(-3., 9.)];
        let poly = clip_triangle_to_cell(&p, IVec2::new(1, 1));
        assert_eq!(poly.len(), 4);
        // The cell is fully interior, so the clip is the unit box.
        for q in &poly {
            assert!((q.x == 0. || q.x == 1.) && (q.y == 0. || q.y == 1.));
        }
    }

    #[test]
    fn clip_misses_cell() {
        let p = [Vec2::ZERO, Vec2::new(1., 0.), Vec2::new(0., 1.)];
        let poly = clip_triangle_to_cell(&p, IVec2::new(5, 5));
        assert!(poly.is_empty());
    }

    #[test]
    fn clip_partial_overlap() {
        // A triangle overlapping the left half of cell (0, 0).
        let p = [Vec2::new(-1., 0.), Vec2::new(0.5, 0.), Vec2::new(-1., 1.)];
        let poly = clip_triangle_to_cell(&p, IVec2::new(0, 0));
        assert!(poly.len() >= 3);
        let area = {
            let mut a = 0.;
            for i in 0..poly.len() {
                let q = poly[i];
                let r = poly[(i + 1) % poly.len()];
                a += q.cross(r);
            }
            0.5 * a.abs()
        };
        // Triangle area inside the cell: a right triangle of legs 0.5 and 1/3.
        assert!((area - 0.5 * 0.5 * (1. / 3.)).abs() < 1e-6, "area {area}");
    }
}
