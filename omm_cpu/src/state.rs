// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opacity states, special indices and the coverage classifier.

use crate::desc::{Format, UnknownStatePromotion};
use omm_common::bird;

/// The opacity of a micro-triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpacityState {
    /// Every covered texel is below the alpha cutoff.
    Transparent = 0,
    /// Every covered texel is above the alpha cutoff.
    Opaque = 1,
    /// Mixed coverage, biased transparent.
    UnknownTransparent = 2,
    /// Mixed coverage, biased opaque.
    UnknownOpaque = 3,
}

impl OpacityState {
    /// Whether this is one of the two known states.
    #[inline]
    pub fn is_known(self) -> bool {
        matches!(self, Self::Transparent | Self::Opaque)
    }

    /// Whether this is one of the two unknown states.
    #[inline]
    pub fn is_unknown(self) -> bool {
        !self.is_known()
    }

    /// The 3-state projection: both unknown variants collapse to
    /// [`UnknownOpaque`](Self::UnknownOpaque).
    #[inline]
    pub fn collapse_unknown(self) -> Self {
        if self == Self::UnknownTransparent {
            Self::UnknownOpaque
        } else {
            self
        }
    }

    /// Decode a state from its serialized 2-bit value.
    #[inline]
    pub fn from_raw(raw: u8) -> Self {
        match raw & 3 {
            0 => Self::Transparent,
            1 => Self::Opaque,
            2 => Self::UnknownTransparent,
            _ => Self::UnknownOpaque,
        }
    }
}

/// A sentinel index standing in for a micromap that is uniform in one state.
///
/// Special indices are negative and carry no payload in the micromap array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum SpecialIndex {
    /// Every micro-triangle is transparent.
    FullyTransparent = -1,
    /// Every micro-triangle is opaque.
    FullyOpaque = -2,
    /// Every micro-triangle is unknown, biased transparent.
    FullyUnknownTransparent = -3,
    /// Every micro-triangle is unknown, biased opaque.
    FullyUnknownOpaque = -4,
}

impl SpecialIndex {
    /// The special index replacing a micromap uniform in `state`.
    #[inline]
    pub fn from_uniform_state(state: OpacityState) -> Self {
        match state {
            OpacityState::Transparent => Self::FullyTransparent,
            OpacityState::Opaque => Self::FullyOpaque,
            OpacityState::UnknownTransparent => Self::FullyUnknownTransparent,
            OpacityState::UnknownOpaque => Self::FullyUnknownOpaque,
        }
    }

    /// The sentinel value written into the index buffer.
    #[inline]
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Per-micro-triangle tallies of raster samples on either side of the cutoff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Coverage {
    /// Samples above the cutoff.
    pub opaque: u32,
    /// Samples at or below the cutoff.
    pub transparent: u32,
}

/// Classify a coverage tally into an opacity state.
///
/// Mixed tallies are unknown; the unknown variant follows `promotion`. The
/// 2-state format has no unknown bit, so its unknowns collapse onto the known
/// state of the same bias.
pub fn state_from_coverage(
    format: Format,
    promotion: UnknownStatePromotion,
    coverage: Coverage,
) -> OpacityState {
    debug_assert!(coverage.opaque != 0 || coverage.transparent != 0);
    if coverage.opaque != 0 && coverage.transparent != 0 {
        let unknown = match promotion {
            UnknownStatePromotion::Nearest => {
                if coverage.opaque >= coverage.transparent {
                    OpacityState::UnknownOpaque
                } else {
                    OpacityState::UnknownTransparent
                }
            }
            UnknownStatePromotion::ForceOpaque => OpacityState::UnknownOpaque,
            UnknownStatePromotion::ForceTransparent => OpacityState::UnknownTransparent,
        };
        match format {
            Format::OC1_2State => {
                if unknown == OpacityState::UnknownOpaque {
                    OpacityState::Opaque
                } else {
                    OpacityState::Transparent
                }
            }
            Format::OC1_4State => unknown,
        }
    } else if coverage.opaque != 0 {
        OpacityState::Opaque
    } else {
        OpacityState::Transparent
    }
}

/// The per-work-item state array, kept in two parallel forms.
///
/// The 4-state bytes are what gets serialized; the 3-state projection (both
/// unknown variants folded together) is what hashing and similarity compare.
/// Both are written together at classification time so the inner dedup loops
/// never branch on unknown variants.
#[derive(Clone, Debug)]
pub(crate) struct StateVec {
    four: Vec<u8>,
    three: Vec<u8>,
}

impl StateVec {
    pub(crate) fn new(subdivision_level: u32) -> Self {
        let n = bird::micro_triangle_count(subdivision_level) as usize;
        Self {
            four: vec![0; n],
            three: vec![0; n],
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.four.len()
    }

    #[inline]
    pub(crate) fn set(&mut self, index: u32, state: OpacityState) {
        self.four[index as usize] = state as u8;
        self.three[index as usize] = state.collapse_unknown() as u8;
    }

    #[inline]
    pub(crate) fn get(&self, index: u32) -> OpacityState {
        OpacityState::from_raw(self.four[index as usize])
    }

    #[inline]
    pub(crate) fn get3(&self, index: u32) -> OpacityState {
        OpacityState::from_raw(self.three[index as usize])
    }

    /// The 3-state projection as raw bytes, for hashing.
    #[inline]
    pub(crate) fn three_state_bytes(&self) -> &[u8] {
        &self.three
    }
}
