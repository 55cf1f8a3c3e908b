// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Work-item construction and workload validation.
//!
//! One work item is one micromap to bake. Primitives that agree exactly on
//! (UV triangle, subdivision level, format) fold onto a single work item up
//! front, so the expensive raster stage never runs twice for identical input.

use crate::desc::{BakeInput, Format, SUBDIVISION_DISABLED};
use crate::state::{SpecialIndex, StateVec};
use crate::Error;
use core::hash::Hasher;
use omm_common::bird::MAX_SUBDIVISION_LEVEL;
use omm_common::geometry::Triangle;
use omm_common::math::IVec2;
use rustc_hash::{FxHashMap, FxHasher};
use smallvec::SmallVec;

/// One micromap to bake, and the primitives that will reference it.
#[derive(Clone, Debug)]
pub(crate) struct WorkItem {
    pub subdivision_level: u32,
    pub format: Format,
    pub uv_tri: Triangle,
    /// The primitives sharing this micromap. Empty once the item is retired.
    pub primitives: SmallVec<[u32; 1]>,
    pub states: StateVec,
    /// `Some` once the item resolves to a special index (uniform promotion or
    /// retirement) instead of a descriptor.
    pub special_index: Option<SpecialIndex>,
    /// The descriptor index assigned during serialization.
    pub desc_index: u32,
}

impl WorkItem {
    fn new(format: Format, subdivision_level: u32, primitive: u32, uv_tri: Triangle) -> Self {
        Self {
            subdivision_level,
            format,
            uv_tri,
            primitives: SmallVec::from_elem(primitive, 1),
            states: StateVec::new(subdivision_level),
            special_index: None,
            desc_index: 0,
        }
    }

    /// Whether this item was merged away. Retirement is permanent.
    #[inline]
    pub fn is_retired(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Merge this item away: it keeps no primitives and resolves to the −1
    /// sentinel so every later stage skips it.
    pub fn retire(&mut self) {
        self.primitives.clear();
        self.special_index = Some(SpecialIndex::FullyTransparent);
    }
}

/// A 64-bit digest of arbitrary bytes, seeded for this pipeline.
#[inline]
pub(crate) fn digest64(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(42);
    hasher.write(bytes);
    hasher.finish()
}

fn fingerprint(tri: &Triangle, subdivision_level: u32, format: Format) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(42);
    for p in [tri.p0, tri.p1, tri.p2] {
        hasher.write_u32(p.x.to_bits());
        hasher.write_u32(p.y.to_bits());
    }
    hasher.write_u32(subdivision_level);
    hasher.write_u16(format as u16);
    hasher.finish()
}

/// The subdivision level chosen for one primitive, or `None` when the
/// primitive is disabled.
fn subdivision_level_for_primitive(
    input: &BakeInput<'_>,
    primitive: usize,
    uv_tri: &Triangle,
    tex_size: IVec2,
) -> Option<u32> {
    if let Some(&level) = input.subdivision_levels.and_then(|l| l.get(primitive)) {
        if level == SUBDIVISION_DISABLED {
            return None;
        }
        if u32::from(level) <= MAX_SUBDIVISION_LEVEL {
            return Some(u32::from(level));
        }
    }
    if input.dynamic_subdivision_scale > 0. {
        return Some(dynamic_subdivision_level(
            input.dynamic_subdivision_scale,
            uv_tri,
            tex_size,
            input.max_subdivision_level,
        ));
    }
    Some(input.max_subdivision_level)
}

/// Solve `texel_area / 4^level ~= scale^2` for the level, in log space.
fn dynamic_subdivision_level(
    scale: f32,
    uv_tri: &Triangle,
    tex_size: IVec2,
    max_level: u32,
) -> u32 {
    let size = tex_size.as_vec2();
    let texel_tri = Triangle::new(uv_tri.p0 * size, uv_tri.p1 * size, uv_tri.p2 * size);
    let target_area = scale * scale;
    let ratio = (texel_tri.area() / target_area) as u32;
    let log2_ratio = if ratio <= 1 {
        0
    } else {
        (ratio - 1).ilog2() + 1
    };
    (log2_ratio >> 1).min(max_level)
}

/// Decode the mesh into one work item per unique (triangle, level, format).
pub(crate) fn build_work_items(input: &BakeInput<'_>) -> Result<Vec<WorkItem>, Error> {
    let triangle_count = input.triangle_count();
    let tex_size = input.texture.size(0);

    let mut items: Vec<WorkItem> = Vec::with_capacity(triangle_count.min(1 << 16));
    let mut fingerprint_to_item: FxHashMap<u64, u32> = FxHashMap::default();

    for primitive in 0..triangle_count {
        let mut uv = [omm_common::math::Vec2::ZERO; 3];
        for (slot, v) in uv.iter_mut().enumerate() {
            let index = input.indices.get(primitive * 3 + slot);
            *v = input
                .tex_coords
                .fetch(index)
                .ok_or(Error::InvalidArgument("tex-coord index out of bounds"))?;
        }
        let uv_tri = Triangle::new(uv[0], uv[1], uv[2]);

        let Some(subdivision_level) =
            subdivision_level_for_primitive(input, primitive, &uv_tri, tex_size)
        else {
            // Disabled; the index buffer entry stays fully-unknown-opaque.
            continue;
        };
        if uv_tri.is_degenerate() {
            continue;
        }
        let format = input.format_for_primitive(primitive);

        let id = fingerprint(&uv_tri, subdivision_level, format);
        let existing = if input.flags.disable_duplicate_detection {
            None
        } else {
            fingerprint_to_item.get(&id).copied()
        };
        match existing {
            Some(item) => items[item as usize].primitives.push(primitive as u32),
            None => {
                fingerprint_to_item.insert(id, items.len() as u32);
                items.push(WorkItem::new(
                    format,
                    subdivision_level,
                    primitive as u32,
                    uv_tri,
                ));
            }
        }
    }
    Ok(items)
}

// 128 full-HD textures' worth of texels; bakes beyond this take minutes.
const MAX_WORKLOAD_TEXELS: u64 = 1 << 27;

/// Estimate the raster cost and reject workloads over the budget.
pub(crate) fn validate_workload(input: &BakeInput<'_>, items: &[WorkItem]) -> Result<(), Error> {
    if !input.flags.enable_workload_validation {
        return Ok(());
    }
    let size = input.texture.size(0).as_vec2();
    let mut workload = 0_u64;
    for item in items {
        let span = (item.uv_tri.aabb_max - item.uv_tri.aabb_min) * size;
        workload += (span.x as i64).max(0) as u64 * (span.y as i64).max(0) as u64;
    }
    if workload > MAX_WORKLOAD_TEXELS {
        log::warn!("rejecting bake: estimated workload of {workload} texels exceeds the budget");
        return Err(Error::WorkloadTooBig);
    }
    Ok(())
}
