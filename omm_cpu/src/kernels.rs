// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Coverage kernels and the resample stage.
//!
//! Each work item's micro-triangles are classified by conservatively
//! rasterizing them against the alpha texture. Three kernels exist:
//!
//! - *level-line* (linear filter, default): per covered cell, tests whether
//!   the iso-contour `alpha == cutoff` of the cell's bilinear patch crosses
//!   the part of the micro-triangle inside the cell;
//! - *conservative-bilinear* (linear filter with the level-line test disabled,
//!   and the AABB-testing path): per covered cell, classifies by the extrema
//!   of the bilinear patch alone;
//! - *nearest* (nearest filter): per covered cell, a single point sample.
//!
//! Address mode and storage tiling are compiled into the kernels; one runtime
//! selector picks the monomorphized variant per bake, never per pixel.

use crate::desc::{BakeInput, FilterMode};
use crate::state::{state_from_coverage, Coverage};
use crate::workitem::WorkItem;
use omm_common::bird;
use omm_common::geometry::Triangle;
use omm_common::math::{IVec2, Vec2};
use omm_common::raster::{clip_triangle_to_cell, rasterize_conservative};
use omm_common::texture::{
    AlphaTexture, BorderAddressing, ClampAddressing, LinearLayout, MirrorAddressing,
    MirrorOnceAddressing, MortonLayout, TilingLayout, WrapAddressing,
};
use omm_common::texture::{Addressing, AddressMode, TilingMode};
#[cfg(feature = "multithreading")]
use rayon::prelude::*;

// Shift applied to Linear-filter raster grids so each raster cell spans the
// bilinear patch between four texel centers.
const BILINEAR_OFFSET: Vec2 = Vec2::new(-0.5, -0.5);

/// Rasterize and classify every micro-triangle of every work item.
pub(crate) fn resample_work_items(input: &BakeInput<'_>, items: &mut [WorkItem]) {
    let tiling = input.texture.tiling();
    let mode = input.sampler.address_mode;
    macro_rules! with_addressing {
        ($layout:ty) => {
            match mode {
                AddressMode::Wrap => resample_all::<WrapAddressing, $layout>(input, items),
                AddressMode::Mirror => resample_all::<MirrorAddressing, $layout>(input, items),
                AddressMode::Clamp => resample_all::<ClampAddressing, $layout>(input, items),
                AddressMode::Border => resample_all::<BorderAddressing, $layout>(input, items),
                AddressMode::MirrorOnce => {
                    resample_all::<MirrorOnceAddressing, $layout>(input, items)
                }
            }
        };
    }
    match tiling {
        TilingMode::Linear => with_addressing!(LinearLayout),
        TilingMode::MortonZ => with_addressing!(MortonLayout),
    }
}

fn resample_all<A: Addressing, L: TilingLayout>(input: &BakeInput<'_>, items: &mut [WorkItem]) {
    #[cfg(feature = "multithreading")]
    if input.flags.enable_internal_threads {
        // Workers partition strictly by work item, so state writes stay
        // deterministic.
        items
            .par_iter_mut()
            .for_each(|item| resample_item::<A, L>(input, item));
        return;
    }
    for item in items.iter_mut() {
        resample_item::<A, L>(input, item);
    }
}

fn resample_item<A: Addressing, L: TilingLayout>(input: &BakeInput<'_>, item: &mut WorkItem) {
    let micro_triangles = bird::micro_triangle_count(item.subdivision_level);
    for index in 0..micro_triangles {
        let sub_tri = bird::micro_triangle(&item.uv_tri, index, item.subdivision_level);
        let state = match input.sampler.filter {
            FilterMode::Linear => {
                if !input.flags.disable_level_line_intersection {
                    classify_level_line::<A, L>(input, item, &sub_tri)
                } else if input.flags.enable_aabb_testing {
                    classify_aabb::<A, L>(input, item, &sub_tri)
                } else {
                    classify_bilinear_extrema::<A, L>(input, item, &sub_tri)
                }
            }
            FilterMode::Nearest => classify_nearest::<A, L>(input, item, &sub_tri),
        };
        item.states.set(index, state);
    }
}

/// The default linear-filter classification: iterate mips, intersecting the
/// cutoff level line with the micro-triangle. Unknown is absorbing across mips.
fn classify_level_line<A: Addressing, L: TilingLayout>(
    input: &BakeInput<'_>,
    item: &WorkItem,
    sub_tri: &Triangle,
) -> crate::OpacityState {
    let texture = input.texture;
    let mut coverage = Coverage::default();
    for mip in 0..texture.mip_count() {
        let size = texture.size(mip);

        // Seed with a point sample so thin triangles that graze no patch
        // boundary still tally their interior side.
        let alpha = texture.bilinear(A::MODE, sub_tri.p0, mip, input.sampler.border_alpha);
        if input.alpha_cutoff < alpha {
            coverage.opaque += 1;
        } else {
            coverage.transparent += 1;
        }

        let pix = offset_pixel_triangle(sub_tri, size);
        rasterize_conservative(sub_tri, size, BILINEAR_OFFSET, |cell| {
            level_line_cell::<A, L>(input, mip, &pix, cell, &mut coverage);
        });

        let state = state_from_coverage(item.format, input.unknown_state_promotion, coverage);
        if state.is_unknown() {
            break;
        }
    }
    state_from_coverage(item.format, input.unknown_state_promotion, coverage)
}

/// The AABB-testing variant: classify the two triangles tiling the
/// micro-triangle's bounding box by bilinear extrema, on the finest mip only.
fn classify_aabb<A: Addressing, L: TilingLayout>(
    input: &BakeInput<'_>,
    item: &WorkItem,
    sub_tri: &Triangle,
) -> crate::OpacityState {
    let size = input.texture.size(0);
    let (lo, hi) = (sub_tri.aabb_min, sub_tri.aabb_max);
    let lower = Triangle::new(lo, Vec2::new(hi.x, lo.y), Vec2::new(lo.x, hi.y));
    let upper = Triangle::new(hi, Vec2::new(hi.x, lo.y), Vec2::new(lo.x, hi.y));

    let mut coverage = Coverage::default();
    for tri in [&lower, &upper] {
        rasterize_conservative(tri, size, BILINEAR_OFFSET, |cell| {
            bilinear_extrema_cell::<A, L>(input, 0, cell, &mut coverage);
        });
    }
    state_from_coverage(item.format, input.unknown_state_promotion, coverage)
}

/// Linear filter with the level-line test disabled: bilinear extrema per cell,
/// finest mip only.
fn classify_bilinear_extrema<A: Addressing, L: TilingLayout>(
    input: &BakeInput<'_>,
    item: &WorkItem,
    sub_tri: &Triangle,
) -> crate::OpacityState {
    let size = input.texture.size(0);
    let mut coverage = Coverage::default();
    rasterize_conservative(sub_tri, size, BILINEAR_OFFSET, |cell| {
        bilinear_extrema_cell::<A, L>(input, 0, cell, &mut coverage);
    });
    state_from_coverage(item.format, input.unknown_state_promotion, coverage)
}

/// Nearest filter: one point sample per covered texel, iterating mips with
/// unknown absorbing.
fn classify_nearest<A: Addressing, L: TilingLayout>(
    input: &BakeInput<'_>,
    item: &WorkItem,
    sub_tri: &Triangle,
) -> crate::OpacityState {
    let texture = input.texture;
    let mut coverage = Coverage::default();
    for mip in 0..texture.mip_count() {
        let size = texture.size(mip);
        rasterize_conservative(sub_tri, size, Vec2::ZERO, |cell| {
            let alpha = match A::resolve(cell, size) {
                Some(coord) => texture.load_tiled::<L>(coord, mip),
                None => input.sampler.border_alpha,
            };
            if input.alpha_cutoff < alpha {
                coverage.opaque += 1;
            } else {
                coverage.transparent += 1;
            }
        });
        let state = state_from_coverage(item.format, input.unknown_state_promotion, coverage);
        if state.is_unknown() {
            break;
        }
    }
    state_from_coverage(item.format, input.unknown_state_promotion, coverage)
}

/// The micro-triangle in the shifted pixel space of a Linear-filter raster.
#[inline]
fn offset_pixel_triangle(sub_tri: &Triangle, size: IVec2) -> [Vec2; 3] {
    let scale = size.as_vec2();
    [
        sub_tri.p0 * scale + BILINEAR_OFFSET,
        sub_tri.p1 * scale + BILINEAR_OFFSET,
        sub_tri.p2 * scale + BILINEAR_OFFSET,
    ]
}

/// Gather the four bilinear interpolants of the cell anchored at `cell`.
#[inline]
fn gather_cell_corners<A: Addressing, L: TilingLayout>(
    texture: &AlphaTexture,
    mip: u32,
    cell: IVec2,
    border_alpha: f32,
) -> [f32; 4] {
    let size = texture.size(mip);
    let x0 = A::resolve_axis(cell.x, size.x);
    let x1 = A::resolve_axis(cell.x + 1, size.x);
    let y0 = A::resolve_axis(cell.y, size.y);
    let y1 = A::resolve_axis(cell.y + 1, size.y);
    let fetch = |x: Option<i32>, y: Option<i32>| match (x, y) {
        (Some(x), Some(y)) => texture.load_tiled::<L>(IVec2::new(x, y), mip),
        _ => border_alpha,
    };
    [
        fetch(x0, y0),
        fetch(x1, y0),
        fetch(x0, y1),
        fetch(x1, y1),
    ]
}

/// Classify one cell by the extrema of its bilinear patch.
///
/// Bilinear interpolation is a convex combination of the four interpolants, so
/// the corner min/max bound the patch exactly.
fn bilinear_extrema_cell<A: Addressing, L: TilingLayout>(
    input: &BakeInput<'_>,
    mip: u32,
    cell: IVec2,
    coverage: &mut Coverage,
) {
    let [a00, a10, a01, a11] =
        gather_cell_corners::<A, L>(input.texture, mip, cell, input.sampler.border_alpha);
    let min = a00.min(a10).min(a01).min(a11);
    let max = a00.max(a10).max(a01).max(a11);
    if input.alpha_cutoff < min {
        coverage.opaque += 1;
    } else if max <= input.alpha_cutoff {
        coverage.transparent += 1;
    } else {
        coverage.opaque += 1;
        coverage.transparent += 1;
    }
}

/// Classify one cell by intersecting the cutoff level line with the part of
/// the micro-triangle inside the cell.
fn level_line_cell<A: Addressing, L: TilingLayout>(
    input: &BakeInput<'_>,
    mip: u32,
    pix: &[Vec2; 3],
    cell: IVec2,
    coverage: &mut Coverage,
) {
    let [a00, a10, a01, a11] =
        gather_cell_corners::<A, L>(input.texture, mip, cell, input.sampler.border_alpha);
    let min = a00.min(a10).min(a01).min(a11);
    let max = a00.max(a10).max(a01).max(a11);

    // The whole patch is on one side; no level line can cross this cell.
    if input.alpha_cutoff < min {
        coverage.opaque += 1;
        return;
    }
    if max <= input.alpha_cutoff {
        coverage.transparent += 1;
        return;
    }

    // The level line crosses the cell; restrict the question to the region the
    // micro-triangle actually covers.
    let region = clip_triangle_to_cell(pix, cell);
    if region.is_empty() {
        // The conservative raster touched the cell but the triangle has no
        // area here; nothing to tally.
        return;
    }

    // alpha(u, v) - cutoff over the cell-local unit square, as
    // c0 + cx*u + cy*v + cxy*u*v.
    let c0 = a00 - input.alpha_cutoff;
    let cx = a10 - a00;
    let cy = a01 - a00;
    let cxy = a00 - a10 - a01 + a11;
    let eval = |p: Vec2| c0 + cx * p.x + cy * p.y + cxy * p.x * p.y;

    // A bilinear patch has only saddles in its interior, so its range over a
    // convex region is attained on the region's boundary. Along each boundary
    // segment the patch is quadratic in the parameter.
    let mut lo = f32::MAX;
    let mut hi = f32::MIN;
    for i in 0..region.len() {
        let p = region[i];
        let q = region[(i + 1) % region.len()];
        let value = eval(p);
        lo = lo.min(value);
        hi = hi.max(value);

        let d = q - p;
        let a = cxy * d.x * d.y;
        if a != 0. {
            let b = cx * d.x + cy * d.y + cxy * (p.x * d.y + p.y * d.x);
            let t = -b / (2. * a);
            if t > 0. && t < 1. {
                let value = eval(p + d * t);
                lo = lo.min(value);
                hi = hi.max(value);
            }
        }
    }

    if lo > 0. {
        coverage.opaque += 1;
    } else if hi <= 0. {
        coverage.transparent += 1;
    } else {
        coverage.opaque += 1;
        coverage.transparent += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{BakeInput, Format, Indices, TexCoordFormat, TexCoords};
    use crate::state::OpacityState;
    use omm_common::texture::{AlphaTexture, MipDesc, TextureDesc};

    fn checker_texture() -> AlphaTexture {
        AlphaTexture::new(&TextureDesc {
            mips: &[MipDesc {
                width: 2,
                height: 2,
                row_pitch: 0,
                data: &[1., 0., 0., 1.],
            }],
            tiling: TilingMode::Linear,
        })
        .unwrap()
    }

    fn input_over<'a>(texture: &'a AlphaTexture, uvs: &'a [f32]) -> BakeInput<'a> {
        static INDICES: [u32; 3] = [0, 1, 2];
        BakeInput::new(
            texture,
            Indices::U32(&INDICES),
            TexCoords {
                format: TexCoordFormat::Uv32Float,
                data: bytemuck::cast_slice(uvs),
                stride: 0,
            },
        )
    }

    fn classify_one(input: &BakeInput<'_>, level: u32) -> Vec<OpacityState> {
        let mut input = *input;
        input.max_subdivision_level = level;
        let mut items = crate::workitem::build_work_items(&input).unwrap();
        assert_eq!(items.len(), 1);
        resample_work_items(&input, &mut items);
        (0..bird::micro_triangle_count(level))
            .map(|i| items[0].states.get(i))
            .collect()
    }

    #[test]
    fn uniform_texture_is_uniformly_opaque() {
        let texture = AlphaTexture::new(&TextureDesc {
            mips: &[MipDesc {
                width: 2,
                height: 2,
                row_pitch: 0,
                data: &[1.; 4],
            }],
            tiling: TilingMode::Linear,
        })
        .unwrap();
        let uvs = [0., 0., 1., 0., 0., 1.];
        let input = input_over(&texture, &uvs);
        for state in classify_one(&input, 2) {
            assert_eq!(state, OpacityState::Opaque);
        }
    }

    #[test]
    fn checker_produces_all_three_kinds() {
        let texture = checker_texture();
        let uvs = [0., 0., 1., 0., 1., 1.];
        let input = input_over(&texture, &uvs);
        let states = classify_one(&input, 3);
        assert!(states.contains(&OpacityState::Opaque));
        assert!(states.contains(&OpacityState::Transparent));
        assert!(states.iter().any(|s| s.is_unknown()));
    }

    #[test]
    fn two_state_format_never_yields_unknown() {
        let texture = checker_texture();
        let uvs = [0., 0., 1., 0., 1., 1.];
        let mut input = input_over(&texture, &uvs);
        input.format = Format::OC1_2State;
        let states = classify_one(&input, 3);
        assert!(states.iter().all(|s| s.is_known()));
        assert!(states.contains(&OpacityState::Opaque));
        assert!(states.contains(&OpacityState::Transparent));
    }

    #[test]
    fn nearest_filter_matches_texels() {
        let texture = checker_texture();

        // Strictly interior to texel (0, 0), whose alpha is 1.
        let opaque_uvs = [0.1, 0.1, 0.4, 0.1, 0.1, 0.4];
        let mut input = input_over(&texture, &opaque_uvs);
        input.sampler.filter = FilterMode::Nearest;
        for state in classify_one(&input, 1) {
            assert_eq!(state, OpacityState::Opaque);
        }

        // Strictly interior to texel (1, 0), whose alpha is 0.
        let transparent_uvs = [0.6, 0.1, 0.9, 0.1, 0.6, 0.4];
        let mut input = input_over(&texture, &transparent_uvs);
        input.sampler.filter = FilterMode::Nearest;
        for state in classify_one(&input, 1) {
            assert_eq!(state, OpacityState::Transparent);
        }
    }

    #[test]
    fn bilinear_extrema_path_is_conservative_superset() {
        let texture = checker_texture();
        let uvs = [0., 0., 1., 0., 1., 1.];
        let strict = input_over(&texture, &uvs);
        let mut loose = strict;
        loose.flags.disable_level_line_intersection = true;
        let exact = classify_one(&strict, 2);
        let extrema = classify_one(&loose, 2);
        // Dropping the level-line test can only turn known states unknown,
        // never the reverse.
        for (e, x) in exact.iter().zip(&extrema) {
            if x.is_known() {
                assert_eq!(e, x);
            }
        }
    }

    #[test]
    fn aabb_testing_covers_the_bounding_box() {
        let texture = checker_texture();
        let uvs = [0., 0., 1., 0., 1., 1.];
        let mut input = input_over(&texture, &uvs);
        input.flags.disable_level_line_intersection = true;
        input.flags.enable_aabb_testing = true;
        // The AABB of every micro-triangle of this layout overlaps mixed
        // texels, so nothing may classify as fully known opaque-and-transparent
        // at once; states must still be produced for every micro-triangle.
        let states = classify_one(&input, 2);
        assert_eq!(states.len(), 16);
    }
}
