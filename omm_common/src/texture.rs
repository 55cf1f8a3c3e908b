// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An owned, addressable view of a scalar alpha texture.
//!
//! The baker samples alpha through this view only: point loads against a chosen
//! storage tiling and conservative bilinear interpolation, with out-of-range
//! coordinates resolved by the runtime sampler's address mode. Tiling is purely
//! a storage detail; it never changes sampling results.

use crate::math::{lerp, morton2d, IVec2, Vec2};
use thiserror::Error;

/// The largest supported texture dimension, per axis.
pub const MAX_TEXTURE_DIM: u32 = 1 << 16;

/// How texels of the backing store are laid out in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TilingMode {
    /// Row-major order.
    Linear,
    /// Morton (Z-order) interleave, padded to a power-of-two square.
    #[default]
    MortonZ,
}

/// How coordinates outside `[0, size)` resolve to texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressMode {
    /// Repeat the texture.
    Wrap,
    /// Repeat the texture, flipping every other tile.
    Mirror,
    /// Clamp to the edge texels.
    Clamp,
    /// Out-of-range loads produce the sampler's border alpha.
    Border,
    /// Mirror into the negative range once, then clamp.
    MirrorOnce,
}

/// Errors produced when creating an [`AlphaTexture`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TextureError {
    /// The mip chain was empty.
    #[error("a texture requires at least one mip")]
    NoMips,
    /// A mip had a zero or oversized dimension.
    #[error("mip {0} has a zero or oversized dimension")]
    BadDimensions(u32),
    /// A mip's data slice was shorter than its dimensions and row pitch imply.
    #[error("mip {0} data is too small for its dimensions")]
    TooLittleData(u32),
}

/// One mip of caller-provided alpha data.
#[derive(Clone, Copy, Debug)]
pub struct MipDesc<'a> {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Distance between rows of `data`, in texels. `0` means tightly packed.
    pub row_pitch: u32,
    /// Row-major scalar alpha values.
    pub data: &'a [f32],
}

/// A description of the texture to create.
#[derive(Clone, Copy, Debug)]
pub struct TextureDesc<'a> {
    /// The mip chain, finest mip first.
    pub mips: &'a [MipDesc<'a>],
    /// The storage layout of the created texture.
    pub tiling: TilingMode,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct MipLevel {
    size: IVec2,
    data_offset: usize,
    num_elements: usize,
}

/// An owned alpha texture with a mip chain and a fixed storage tiling.
#[derive(Clone, Debug, PartialEq)]
pub struct AlphaTexture {
    mips: Vec<MipLevel>,
    data: Vec<f32>,
    tiling: TilingMode,
}

impl AlphaTexture {
    /// Create a texture by copying the described mips into tiled storage.
    pub fn new(desc: &TextureDesc<'_>) -> Result<Self, TextureError> {
        if desc.mips.is_empty() {
            return Err(TextureError::NoMips);
        }

        let mut mips = Vec::with_capacity(desc.mips.len());
        let mut total = 0_usize;
        for (i, mip) in desc.mips.iter().enumerate() {
            let mip_index = i as u32;
            if mip.width == 0
                || mip.height == 0
                || mip.width > MAX_TEXTURE_DIM
                || mip.height > MAX_TEXTURE_DIM
            {
                return Err(TextureError::BadDimensions(mip_index));
            }
            let pitch = if mip.row_pitch == 0 {
                mip.width
            } else {
                mip.row_pitch
            } as usize;
            let (w, h) = (mip.width as usize, mip.height as usize);
            if mip.data.len() < pitch * (h - 1) + w {
                return Err(TextureError::TooLittleData(mip_index));
            }

            let num_elements = match desc.tiling {
                TilingMode::Linear => w * h,
                TilingMode::MortonZ => {
                    let dim = mip.width.max(mip.height).next_power_of_two() as usize;
                    dim * dim
                }
            };
            mips.push(MipLevel {
                size: IVec2::new(mip.width as i32, mip.height as i32),
                data_offset: total,
                num_elements,
            });
            total += num_elements;
        }

        let mut data = vec![0.; total];
        for (mip, level) in desc.mips.iter().zip(&mips) {
            let pitch = if mip.row_pitch == 0 {
                mip.width
            } else {
                mip.row_pitch
            } as usize;
            let dst = &mut data[level.data_offset..level.data_offset + level.num_elements];
            for y in 0..mip.height as usize {
                let src = &mip.data[y * pitch..y * pitch + mip.width as usize];
                match desc.tiling {
                    TilingMode::Linear => {
                        let row = &mut dst[y * mip.width as usize..(y + 1) * mip.width as usize];
                        row.copy_from_slice(src);
                    }
                    TilingMode::MortonZ => {
                        for (x, &alpha) in src.iter().enumerate() {
                            dst[morton2d(x as u32, y as u32) as usize] = alpha;
                        }
                    }
                }
            }
        }

        Ok(Self {
            mips,
            data,
            tiling: desc.tiling,
        })
    }

    /// The number of mips.
    #[inline]
    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    /// The dimensions of a mip, in texels.
    #[inline]
    pub fn size(&self, mip: u32) -> IVec2 {
        self.mips[mip as usize].size
    }

    /// The storage layout of this texture.
    #[inline]
    pub fn tiling(&self) -> TilingMode {
        self.tiling
    }

    /// Load the texel at an in-range coordinate.
    #[inline]
    pub fn load(&self, coord: IVec2, mip: u32) -> f32 {
        match self.tiling {
            TilingMode::Linear => self.load_tiled::<LinearLayout>(coord, mip),
            TilingMode::MortonZ => self.load_tiled::<MortonLayout>(coord, mip),
        }
    }

    /// Load the texel at an in-range coordinate through a statically chosen layout.
    ///
    /// The layout must match [`tiling`](Self::tiling); the bake dispatch selects
    /// it once per bake so per-texel loads stay branch-free.
    #[inline]
    pub fn load_tiled<L: TilingLayout>(&self, coord: IVec2, mip: u32) -> f32 {
        debug_assert_eq!(L::MODE, self.tiling);
        let level = &self.mips[mip as usize];
        debug_assert!(coord.x >= 0 && coord.x < level.size.x);
        debug_assert!(coord.y >= 0 && coord.y < level.size.y);
        let idx = L::index(coord, level.size);
        self.data[level.data_offset + idx]
    }

    /// Sample the texture bilinearly at a normalized UV coordinate.
    ///
    /// Out-of-range interpolants resolve through `mode`; with
    /// [`AddressMode::Border`] they contribute `border_alpha`.
    pub fn bilinear(&self, mode: AddressMode, uv: Vec2, mip: u32, border_alpha: f32) -> f32 {
        let size = self.size(mip);
        let pixel = uv * size.as_vec2() - Vec2::splat(0.5);
        let base = pixel.floor();
        let (bx, by) = (base.x as i32, base.y as i32);

        let x0 = resolve_axis(mode, bx, size.x);
        let x1 = resolve_axis(mode, bx + 1, size.x);
        let y0 = resolve_axis(mode, by, size.y);
        let y1 = resolve_axis(mode, by + 1, size.y);
        let fetch = |x: Option<i32>, y: Option<i32>| match (x, y) {
            (Some(x), Some(y)) => self.load(IVec2::new(x, y), mip),
            _ => border_alpha,
        };

        let a = fetch(x0, y0);
        let b = fetch(x0, y1);
        let c = fetch(x1, y0);
        let d = fetch(x1, y1);

        let w = pixel - base;
        lerp(lerp(a, c, w.x), lerp(b, d, w.x), w.y)
    }
}

/// Resolve one axis of a texel coordinate through an address mode.
///
/// Returns `None` when the coordinate falls on the border of a
/// [`AddressMode::Border`] sampler.
#[inline]
pub fn resolve_axis(mode: AddressMode, v: i32, n: i32) -> Option<i32> {
    match mode {
        AddressMode::Wrap => Some(v.rem_euclid(n)),
        AddressMode::Mirror => {
            // Reflect the negative range so that -1 maps onto 0, then unfold
            // alternating tiles.
            let a = if v < 0 { -v - 1 } else { v };
            let flipped = (a / n) % 2 == 1;
            let w = a % n;
            Some(if flipped { n - w - 1 } else { w })
        }
        AddressMode::Clamp => Some(v.clamp(0, n - 1)),
        AddressMode::Border => (v >= 0 && v < n).then_some(v),
        AddressMode::MirrorOnce => {
            let a = if v < 0 { -v - 1 } else { v };
            Some(a.min(n - 1))
        }
    }
}

/// Resolve a texel coordinate through an address mode, axis by axis.
#[inline]
pub fn resolve_coord(mode: AddressMode, coord: IVec2, size: IVec2) -> Option<IVec2> {
    let x = resolve_axis(mode, coord.x, size.x)?;
    let y = resolve_axis(mode, coord.y, size.y)?;
    Some(IVec2::new(x, y))
}

/// A statically resolved address mode, for monomorphized sampling kernels.
pub trait Addressing {
    /// The equivalent runtime mode.
    const MODE: AddressMode;

    /// Resolve one axis; `None` denotes the border.
    #[inline]
    fn resolve_axis(v: i32, n: i32) -> Option<i32> {
        resolve_axis(Self::MODE, v, n)
    }

    /// Resolve a full coordinate; `None` denotes the border.
    #[inline]
    fn resolve(coord: IVec2, size: IVec2) -> Option<IVec2> {
        resolve_coord(Self::MODE, coord, size)
    }
}

/// Statically selected [`AddressMode::Wrap`].
pub struct WrapAddressing;
/// Statically selected [`AddressMode::Mirror`].
pub struct MirrorAddressing;
/// Statically selected [`AddressMode::Clamp`].
pub struct ClampAddressing;
/// Statically selected [`AddressMode::Border`].
pub struct BorderAddressing;
/// Statically selected [`AddressMode::MirrorOnce`].
pub struct MirrorOnceAddressing;

impl Addressing for WrapAddressing {
    const MODE: AddressMode = AddressMode::Wrap;
}
impl Addressing for MirrorAddressing {
    const MODE: AddressMode = AddressMode::Mirror;
}
impl Addressing for ClampAddressing {
    const MODE: AddressMode = AddressMode::Clamp;
}
impl Addressing for BorderAddressing {
    const MODE: AddressMode = AddressMode::Border;
}
impl Addressing for MirrorOnceAddressing {
    const MODE: AddressMode = AddressMode::MirrorOnce;
}

/// A statically resolved storage tiling, for monomorphized load kernels.
pub trait TilingLayout {
    /// The equivalent runtime mode.
    const MODE: TilingMode;

    /// The 1-D element index of a texel.
    fn index(coord: IVec2, size: IVec2) -> usize;
}

/// Statically selected [`TilingMode::Linear`].
pub struct LinearLayout;
/// Statically selected [`TilingMode::MortonZ`].
pub struct MortonLayout;

impl TilingLayout for LinearLayout {
    const MODE: TilingMode = TilingMode::Linear;

    #[inline]
    fn index(coord: IVec2, size: IVec2) -> usize {
        coord.x as usize + coord.y as usize * size.x as usize
    }
}

impl TilingLayout for MortonLayout {
    const MODE: TilingMode = TilingMode::MortonZ;

    #[inline]
    fn index(coord: IVec2, _size: IVec2) -> usize {
        morton2d(coord.x as u32, coord.y as u32) as usize
    }
}
