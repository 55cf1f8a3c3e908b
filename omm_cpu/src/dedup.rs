// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Exact and near-duplicate micromap merging.
//!
//! All comparisons run on the 3-state projection, so micromaps differing only
//! in their unknown variants are considered equal. Merging is destructive: the
//! source item hands its primitives to the destination and retires.

use crate::desc::{BakeInput, Format};
use crate::state::OpacityState;
use crate::workitem::{digest64, WorkItem};
use omm_common::bird::{self, MAX_SUBDIVISION_LEVEL};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
// Candidate sets iterate in index order so nearest-distance ties resolve
// deterministically; hence an ordered set.
use std::collections::BTreeSet;

/// Absolute 3-state Hamming distance between two same-level items.
fn hamming_distance(a: &WorkItem, b: &WorkItem) -> u32 {
    debug_assert_eq!(a.subdivision_level, b.subdivision_level);
    a.states
        .three_state_bytes()
        .iter()
        .zip(b.states.three_state_bytes())
        .filter(|(x, y)| x != y)
        .count() as u32
}

/// Mutably borrow two distinct work items at once.
fn pair_mut(items: &mut [WorkItem], to: usize, from: usize) -> (&mut WorkItem, &mut WorkItem) {
    debug_assert_ne!(to, from);
    if to < from {
        let (head, tail) = items.split_at_mut(from);
        (&mut head[to], &mut tail[0])
    } else {
        let (head, tail) = items.split_at_mut(to);
        (&mut tail[0], &mut head[from])
    }
}

/// Merge `from` into `to`: move the primitives over, retire `from`, and widen
/// `to`'s states wherever the two disagree.
fn merge_work_items(to: &mut WorkItem, from: &mut WorkItem) {
    debug_assert_eq!(to.subdivision_level, from.subdivision_level);

    let primitives = core::mem::take(&mut from.primitives);
    to.primitives.extend(primitives);

    for i in 0..bird::micro_triangle_count(from.subdivision_level) {
        let to_state = to.states.get(i);
        let from_state = from.states.get(i);
        if to_state == from_state {
            continue;
        }
        if to_state.is_known() && from_state.is_known() {
            // Opposite certainties cancel out.
            to.states.set(i, OpacityState::UnknownOpaque);
        } else if to_state.is_known() && from_state.is_unknown() {
            to.states.set(i, from_state);
        }
        // Both unknown: keep the destination's variant.
    }

    from.retire();
}

/// Fold micromaps with identical 3-state content onto their first occurrence.
pub(crate) fn dedup_exact(input: &BakeInput<'_>, items: &mut [WorkItem]) {
    if input.flags.disable_duplicate_detection {
        return;
    }

    let mut duplicates = 0_u32;
    let mut digest_to_item: FxHashMap<u64, usize> = FxHashMap::default();
    for i in 0..items.len() {
        if items[i].is_retired() {
            continue;
        }
        let digest = digest64(items[i].states.three_state_bytes());
        match digest_to_item.get(&digest).copied() {
            None => {
                digest_to_item.insert(digest, i);
            }
            Some(first) => {
                let (keep, drop) = pair_mut(items, first, i);
                let primitives = core::mem::take(&mut drop.primitives);
                keep.primitives.extend(primitives);
                drop.retire();
                duplicates += 1;
            }
        }
    }
    if duplicates != 0 {
        log::debug!("exact deduplication folded {duplicates} micromaps");
    }
}

// LSH parameters: merge items closer than `LSH_RADIUS_FRACTION * d` under the
// 3-state Hamming metric, accepting an approximation factor of
// `LSH_APPROXIMATION`. Table and key sizes follow from the classic bit-sampling
// construction for Hamming space.
const LSH_RADIUS_FRACTION: f32 = 0.15;
const LSH_APPROXIMATION: f32 = 4.;

struct HashTable {
    bit_indices: Vec<u32>,
    item_keys: Vec<u64>,
    buckets: FxHashMap<u64, Vec<u32>>,
}

/// Merge near-duplicate micromaps via locality-sensitive hashing.
pub(crate) fn dedup_similar_lsh(input: &BakeInput<'_>, items: &mut [WorkItem], iterations: u32) {
    if !input.flags.enable_near_duplicate_detection
        || input.flags.enable_near_duplicate_detection_brute_force
    {
        return;
    }

    let mut rng = SmallRng::seed_from_u64(42);
    let mut merged = 0_u32;

    for _ in 0..iterations {
        for subdivision_level in 1..=MAX_SUBDIVISION_LEVEL {
            let batch: Vec<u32> = (0..items.len() as u32)
                .filter(|&i| {
                    let item = &items[i as usize];
                    item.special_index.is_none()
                        && item.format == Format::OC1_4State
                        && item.subdivision_level == subdivision_level
                })
                .collect();
            if batch.is_empty() {
                continue;
            }

            let n = batch.len() as u32;
            let d = bird::micro_triangle_count(subdivision_level);
            let radius = LSH_RADIUS_FRACTION * d as f32;

            let table_count = (n as f32).powf(1. / LSH_APPROXIMATION).ceil() as u32;
            let key_bits =
                (((n as f32).ln() * d as f32) / (LSH_APPROXIMATION * radius)).ceil() as u32;
            if table_count == 0 || key_bits == 0 {
                // Too few items for the construction to make sense; an
                // exhaustive pass would cost as much as it saves.
                continue;
            }

            let mut tables: Vec<HashTable> = (0..table_count)
                .map(|_| HashTable {
                    bit_indices: (0..key_bits).map(|_| rng.next_u32() & (d - 1)).collect(),
                    item_keys: vec![0; items.len()],
                    buckets: FxHashMap::default(),
                })
                .collect();

            let mut samples: Vec<u8> = vec![0; key_bits as usize];
            for &item_index in &batch {
                let item = &items[item_index as usize];
                for table in &mut tables {
                    for (sample, &bit) in samples.iter_mut().zip(&table.bit_indices) {
                        *sample = item.states.get3(bit) as u8;
                    }
                    let key = digest64(&samples);
                    table.item_keys[item_index as usize] = key;
                    table.buckets.entry(key).or_default().push(item_index);
                }
            }

            let mut candidates: BTreeSet<u32> = BTreeSet::new();
            for &item_index in &batch {
                if items[item_index as usize].special_index.is_some() {
                    // Already merged away earlier in this pass.
                    continue;
                }

                candidates.clear();
                for table in &tables {
                    let key = table.item_keys[item_index as usize];
                    let Some(bucket) = table.buckets.get(&key) else {
                        continue;
                    };
                    for &other in bucket {
                        if other == item_index
                            || items[other as usize].special_index.is_some()
                        {
                            continue;
                        }
                        // The cap bounds the current bucket only; the
                        // remaining tables are still probed.
                        if candidates.len() as u32 > 3 * table_count {
                            break;
                        }
                        candidates.insert(other);
                    }
                }

                let mut nearest = None;
                let mut nearest_distance = f32::MAX;
                for &candidate in &candidates {
                    let distance =
                        hamming_distance(&items[item_index as usize], &items[candidate as usize])
                            as f32;
                    if distance < radius && distance < nearest_distance {
                        nearest_distance = distance;
                        nearest = Some(candidate);
                    }
                }
                if let Some(similar) = nearest {
                    let (to, from) = pair_mut(items, item_index as usize, similar as usize);
                    merge_work_items(to, from);
                    merged += 1;
                }
            }
        }
    }
    if merged != 0 {
        log::debug!("near-duplicate detection merged {merged} micromaps");
    }
}

// Bounds for the exhaustive fallback: scan at most this many following items
// per candidate, and merge below this normalized distance.
const BRUTE_FORCE_WINDOW: usize = 2048;
const BRUTE_FORCE_MERGE_THRESHOLD: f32 = 0.1;

/// Merge near-duplicate micromaps by bounded exhaustive search.
pub(crate) fn dedup_similar_brute_force(input: &BakeInput<'_>, items: &mut [WorkItem]) {
    if !input.flags.enable_near_duplicate_detection
        || !input.flags.enable_near_duplicate_detection_brute_force
    {
        return;
    }
    if items.is_empty() {
        return;
    }

    let mut already_merged: FxHashSet<usize> = FxHashSet::default();
    for a in 0..items.len() - 1 {
        let item_a = &items[a];
        if item_a.special_index.is_some() || item_a.format != Format::OC1_4State {
            continue;
        }

        let window_end = (a + 1 + BRUTE_FORCE_WINDOW).min(items.len());
        let mut nearest = None;
        let mut nearest_distance = f32::MAX;
        for b in a + 1..window_end {
            let item_b = &items[b];
            if item_b.special_index.is_some()
                || item_b.format != Format::OC1_4State
                || item_b.is_retired()
                || item_b.subdivision_level != items[a].subdivision_level
                || already_merged.contains(&b)
            {
                continue;
            }
            let d = bird::micro_triangle_count(item_b.subdivision_level) as f32;
            let distance = hamming_distance(&items[a], item_b) as f32 / d;
            if distance < BRUTE_FORCE_MERGE_THRESHOLD && distance < nearest_distance {
                nearest_distance = distance;
                nearest = Some(b);
            }
        }
        if let Some(b) = nearest {
            already_merged.insert(a);
            already_merged.insert(b);
            let (to, from) = pair_mut(items, a, b);
            merge_work_items(to, from);
        }
    }
}
