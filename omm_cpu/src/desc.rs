// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bake input descriptor and its validation.

use crate::Error;
use omm_common::bird::MAX_SUBDIVISION_LEVEL;
use omm_common::math::Vec2;
use omm_common::texture::{AddressMode, AlphaTexture};

/// A per-primitive subdivision override with this value disables baking for
/// that primitive; it receives the fully-unknown-opaque special index.
pub const SUBDIVISION_DISABLED: u8 = 0xE;

/// The serialized layout of micromap states.
// The variant names follow the format names of the micromap standard.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Format {
    /// One bit per micro-triangle; transparent or opaque only.
    OC1_2State = 1,
    /// Two bits per micro-triangle; the full four-state alphabet.
    OC1_4State = 2,
}

impl Format {
    /// The number of bits one micro-triangle state occupies.
    #[inline]
    pub fn bits_per_state(self) -> u32 {
        match self {
            Self::OC1_2State => 1,
            Self::OC1_4State => 2,
        }
    }
}

/// The texture filter the runtime will sample the alpha texture with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Point sampling.
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Linear,
}

/// A description of the runtime sampler the bake must be conservative against.
#[derive(Clone, Copy, Debug)]
pub struct SamplerDesc {
    /// How out-of-range coordinates resolve.
    pub address_mode: AddressMode,
    /// The runtime texture filter.
    pub filter: FilterMode,
    /// The alpha value of [`AddressMode::Border`] texels.
    pub border_alpha: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            address_mode: AddressMode::Clamp,
            filter: FilterMode::Linear,
            border_alpha: 1.,
        }
    }
}

/// Which unknown variant mixed coverage promotes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnknownStatePromotion {
    /// Pick the variant of the dominant side of the tally.
    #[default]
    Nearest,
    /// Always promote to unknown-opaque.
    ForceOpaque,
    /// Always promote to unknown-transparent.
    ForceTransparent,
}

/// Options toggling individual bake pipeline stages.
///
/// The trailing group is internal tuning surface; the defaults are what
/// shipping integrations use.
#[derive(Clone, Copy, Debug, Default)]
pub struct BakeFlags {
    /// Rasterize work items in parallel.
    pub enable_internal_threads: bool,
    /// Materialize uniform micromaps as descriptors instead of special indices.
    pub disable_special_indices: bool,
    /// Keep 32-bit index output even when 16-bit entries would suffice.
    pub force_32_bit_indices: bool,
    /// Skip exact duplicate folding and exact deduplication.
    pub disable_duplicate_detection: bool,
    /// Merge micromaps that differ in only a small fraction of states.
    pub enable_near_duplicate_detection: bool,
    /// Reject workloads whose texel budget suggests an unreasonable bake time.
    pub enable_workload_validation: bool,
    /// Rasterize the bounding box of each micro-triangle instead of the
    /// micro-triangle itself. Requires `disable_level_line_intersection`.
    pub enable_aabb_testing: bool,
    /// Keep micromaps whose known fraction falls below the rejection threshold.
    pub disable_remove_poor_quality_omm: bool,
    /// Classify cells by bilinear extrema only, without intersecting the
    /// cutoff level line against the micro-triangle.
    pub disable_level_line_intersection: bool,
    /// Use the bounded exhaustive scan instead of locality-sensitive hashing
    /// for near-duplicate detection.
    pub enable_near_duplicate_detection_brute_force: bool,
}

/// The triangle index buffer of the mesh being baked.
#[derive(Clone, Copy, Debug)]
pub enum Indices<'a> {
    /// 16-bit indices.
    U16(&'a [u16]),
    /// 32-bit indices.
    U32(&'a [u32]),
}

impl Indices<'_> {
    /// The number of indices.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::U16(s) => s.len(),
            Self::U32(s) => s.len(),
        }
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The index at `i`, widened to 32 bits.
    #[inline]
    pub fn get(&self, i: usize) -> u32 {
        match self {
            Self::U16(s) => u32::from(s[i]),
            Self::U32(s) => s[i],
        }
    }
}

/// The encoding of one tex-coord pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexCoordFormat {
    /// Two 16-bit normalized integers.
    Uv16Unorm,
    /// Two 16-bit floats.
    Uv16Float,
    /// Two 32-bit floats.
    Uv32Float,
}

impl TexCoordFormat {
    /// The size of one encoded pair, in bytes.
    #[inline]
    pub fn element_size(self) -> usize {
        match self {
            Self::Uv16Unorm | Self::Uv16Float => 4,
            Self::Uv32Float => 8,
        }
    }
}

/// The tex-coord buffer of the mesh being baked, as raw bytes plus a stride.
#[derive(Clone, Copy, Debug)]
pub struct TexCoords<'a> {
    /// The encoding of each pair.
    pub format: TexCoordFormat,
    /// The raw buffer.
    pub data: &'a [u8],
    /// Distance between consecutive pairs, in bytes. `0` means tightly packed.
    pub stride: u32,
}

impl TexCoords<'_> {
    #[inline]
    fn stride_bytes(&self) -> usize {
        if self.stride == 0 {
            self.format.element_size()
        } else {
            self.stride as usize
        }
    }

    /// Decode the UV pair at `index`, or `None` when it lies outside the buffer.
    pub fn fetch(&self, index: u32) -> Option<Vec2> {
        let offset = index as usize * self.stride_bytes();
        let bytes = self.data.get(offset..offset + self.format.element_size())?;
        Some(match self.format {
            TexCoordFormat::Uv16Unorm => {
                let [u, v]: [u16; 2] = bytemuck::pod_read_unaligned(bytes);
                Vec2::new(f32::from(u) / 65535., f32::from(v) / 65535.)
            }
            TexCoordFormat::Uv16Float => {
                let [u, v]: [u16; 2] = bytemuck::pod_read_unaligned(bytes);
                Vec2::new(half_to_f32(u), half_to_f32(v))
            }
            TexCoordFormat::Uv32Float => {
                let [u, v]: [f32; 2] = bytemuck::pod_read_unaligned(bytes);
                Vec2::new(u, v)
            }
        })
    }
}

/// Expand an IEEE 754 half-precision bit pattern to `f32`.
fn half_to_f32(h: u16) -> f32 {
    let sign = u32::from(h >> 15) << 31;
    let exp = u32::from(h >> 10) & 0x1F;
    let mantissa = u32::from(h) & 0x3FF;
    let bits = if exp == 0 {
        if mantissa == 0 {
            sign
        } else {
            // Subnormal half; renormalize around the mantissa's top bit.
            let top = 31 - mantissa.leading_zeros();
            sign | ((top + 103) << 23) | ((mantissa << (23 - top)) & 0x007F_FFFF)
        }
    } else if exp == 0x1F {
        sign | 0x7F80_0000 | (mantissa << 13)
    } else {
        sign | ((exp + 112) << 23) | (mantissa << 13)
    };
    f32::from_bits(bits)
}

/// Everything a bake consumes.
///
/// Construct with [`BakeInput::new`] and override the defaulted fields as
/// needed before calling [`bake`](crate::bake()).
#[derive(Clone, Copy, Debug)]
pub struct BakeInput<'a> {
    /// The alpha texture to classify against.
    pub texture: &'a AlphaTexture,
    /// The alpha-test cutoff; alpha strictly above it is opaque.
    pub alpha_cutoff: f32,
    /// The runtime sampler the bake must be conservative against.
    pub sampler: SamplerDesc,
    /// The triangle index buffer; every three indices form a primitive.
    pub indices: Indices<'a>,
    /// The tex-coord buffer the indices address.
    pub tex_coords: TexCoords<'a>,
    /// The micromap format, unless overridden per primitive.
    pub format: Format,
    /// Optional per-primitive format overrides.
    pub formats: Option<&'a [Format]>,
    /// The highest subdivision level the bake may choose.
    pub max_subdivision_level: u32,
    /// Optional per-primitive subdivision levels. Values above
    /// [`MAX_SUBDIVISION_LEVEL`] are ignored, except [`SUBDIVISION_DISABLED`],
    /// which skips the primitive.
    pub subdivision_levels: Option<&'a [u8]>,
    /// When positive, derive each primitive's subdivision level from its texel
    /// area so one micro-triangle covers roughly `scale * scale` texels.
    pub dynamic_subdivision_scale: f32,
    /// When positive, micromaps whose fraction of known states falls below
    /// this threshold collapse to the fully-unknown-transparent special index.
    pub rejection_threshold: f32,
    /// Which unknown variant mixed coverage promotes to.
    pub unknown_state_promotion: UnknownStatePromotion,
    /// Stage toggles.
    pub flags: BakeFlags,
}

impl<'a> BakeInput<'a> {
    /// Create a bake input with defaults for everything but the mesh and texture.
    pub fn new(texture: &'a AlphaTexture, indices: Indices<'a>, tex_coords: TexCoords<'a>) -> Self {
        Self {
            texture,
            alpha_cutoff: 0.5,
            sampler: SamplerDesc::default(),
            indices,
            tex_coords,
            format: Format::OC1_4State,
            formats: None,
            max_subdivision_level: MAX_SUBDIVISION_LEVEL,
            subdivision_levels: None,
            dynamic_subdivision_scale: 0.,
            rejection_threshold: 0.,
            unknown_state_promotion: UnknownStatePromotion::default(),
            flags: BakeFlags::default(),
        }
    }

    /// The number of primitives the bake will produce index entries for.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.indices.is_empty() {
            return Err(Error::InvalidArgument("empty index buffer"));
        }
        if self.tex_coords.data.is_empty() {
            return Err(Error::InvalidArgument("empty tex-coord buffer"));
        }
        if self.max_subdivision_level > MAX_SUBDIVISION_LEVEL {
            return Err(Error::InvalidArgument(
                "max subdivision level above the supported maximum",
            ));
        }
        if self.flags.enable_aabb_testing && !self.flags.disable_level_line_intersection {
            return Err(Error::InvalidArgument(
                "AABB testing requires level-line intersection to be disabled",
            ));
        }
        Ok(())
    }

    /// The format of primitive `i`, honoring per-primitive overrides.
    #[inline]
    pub(crate) fn format_for_primitive(&self, i: usize) -> Format {
        self.formats
            .and_then(|f| f.get(i).copied())
            .unwrap_or(self.format)
    }
}
