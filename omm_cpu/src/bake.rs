// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bake pipeline.

use crate::desc::{BakeInput, Format};
use crate::serialize::{serialize, BakeOutput};
use crate::state::{OpacityState, SpecialIndex};
use crate::workitem::{build_work_items, validate_workload, WorkItem};
use crate::{dedup, kernels, Error};
use omm_common::bird::{self, SUBDIVISION_LEVEL_COUNT};
use omm_common::math::{morton2d, IVec2};
use omm_common::texture::{resolve_coord, AddressMode};

/// Bake opacity micromaps for an alpha-tested mesh.
///
/// Runs the full pipeline: work-item construction, optional workload
/// validation, conservative rasterization, special-index promotion,
/// deduplication, spatial sorting and serialization. The first failing stage
/// aborts the bake; no partial output is returned.
pub fn bake(input: &BakeInput<'_>) -> Result<BakeOutput, Error> {
    input.validate()?;

    let mut items = build_work_items(input)?;
    validate_workload(input, &items)?;
    kernels::resample_work_items(input, &mut items);

    // Promote before deduplication so uniform micromaps fold by special index
    // alone, and again afterwards because merges may have become uniform.
    promote_special_indices(input, &mut items);
    dedup::dedup_exact(input, &mut items);
    dedup::dedup_similar_lsh(input, &mut items, 3);
    dedup::dedup_similar_brute_force(input, &mut items);
    promote_special_indices(input, &mut items);

    let (array_histogram, index_histogram) = usage_histograms(&items);
    let order = spatial_sort(&items);
    serialize(
        input,
        &mut items,
        &array_histogram,
        &index_histogram,
        &order,
    )
}

/// Collapse uniform micromaps to special indices, and optionally reject
/// micromaps that are mostly unknown anyway.
fn promote_special_indices(input: &BakeInput<'_>, items: &mut [WorkItem]) {
    for item in items.iter_mut() {
        if item.is_retired() {
            continue;
        }
        let micro_triangles = bird::micro_triangle_count(item.subdivision_level);

        let mut uniform = true;
        let mut common = item.states.get(0);
        for i in 1..micro_triangles {
            uniform &= common == item.states.get(i);
        }

        if !uniform
            && input.rejection_threshold > 0.
            && !input.flags.disable_remove_poor_quality_omm
        {
            let known = (0..micro_triangles)
                .filter(|&i| item.states.get(i).is_known())
                .count();
            let known_fraction = known as f32 / micro_triangles as f32;
            if known_fraction < input.rejection_threshold {
                // Not enough certainty to be worth the memory.
                uniform = true;
                common = OpacityState::UnknownTransparent;
            }
        }

        if uniform && !input.flags.disable_special_indices {
            item.special_index = Some(SpecialIndex::from_uniform_state(common));
        }
    }
}

/// Micromap counts bucketed by format and subdivision level.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct UsageGrid {
    counts: [[u32; SUBDIVISION_LEVEL_COUNT]; 2],
}

impl UsageGrid {
    #[inline]
    fn format_slot(format: Format) -> usize {
        match format {
            Format::OC1_2State => 0,
            Format::OC1_4State => 1,
        }
    }

    #[inline]
    pub(crate) fn add(&mut self, format: Format, subdivision_level: u32, count: u32) {
        self.counts[Self::format_slot(format)][subdivision_level as usize] += count;
    }

    #[inline]
    pub(crate) fn get(&self, format: Format, subdivision_level: u32) -> u32 {
        self.counts[Self::format_slot(format)][subdivision_level as usize]
    }
}

/// Count surviving micromaps (array) and their referencing primitives (index).
fn usage_histograms(items: &[WorkItem]) -> (UsageGrid, UsageGrid) {
    let mut array = UsageGrid::default();
    let mut index = UsageGrid::default();
    for item in items {
        if item.special_index.is_none() {
            array.add(item.format, item.subdivision_level, 1);
            index.add(
                item.format,
                item.subdivision_level,
                item.primitives.len() as u32,
            );
        }
    }
    (array, index)
}

// The centroid quantization grid of the spatial sort keys.
const SORT_GRID_BITS: u32 = 13;

/// Order work items for serialization: special-indexed items first, then by
/// subdivision level descending, then along a Morton curve over the UV
/// centroid so nearby micromaps share cache lines.
fn spatial_sort(items: &[WorkItem]) -> Vec<(u64, u32)> {
    let grid = IVec2::new(1 << SORT_GRID_BITS, 1 << SORT_GRID_BITS);
    let mut keys: Vec<(u64, u32)> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let key = if item.special_index.is_some() {
                (1_u64 << 63) | index as u64
            } else {
                let centroid = item.uv_tri.centroid() * grid.as_vec2();
                let quantized = IVec2::new(centroid.x as i32, centroid.y as i32);
                // Out-of-range centroids reflect back into the grid.
                let folded = resolve_coord(AddressMode::MirrorOnce, quantized, grid)
                    .expect("mirror-once always resolves");
                let morton = morton2d(folded.x as u32, folded.y as u32);
                debug_assert!(morton < 1 << 60);
                (u64::from(item.subdivision_level) << 60) | morton
            };
            (key, index as u32)
        })
        .collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys
}
