// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A CPU baker for opacity micromaps.
//!
//! Alpha-tested geometry forces ray tracers to invoke shading just to learn
//! whether a hit was real. An opacity micromap (OMM) precomputes that answer
//! for a hierarchical subdivision of each triangle, so provably opaque and
//! provably transparent micro-triangles skip the shader entirely. This crate
//! implements the bake: it classifies every micro-triangle of a mesh against
//! an alpha texture, deduplicates the resulting micromaps, and serializes them
//! into the bit-packed arrays consumed by ray-tracing APIs.
//!
//! ## Usage
//!
//! - Wrap your alpha channel in an [`AlphaTexture`].
//! - Describe the mesh and sampler with a [`BakeInput`].
//! - Call [`bake`] and upload the buffers of the returned [`BakeOutput`].
//!
//! ```rust
//! use omm_cpu::{bake, AlphaTexture, BakeInput, Indices, MipDesc, TexCoordFormat,
//!     TexCoords, TextureDesc, TilingMode};
//!
//! let texture = AlphaTexture::new(&TextureDesc {
//!     mips: &[MipDesc { width: 2, height: 2, row_pitch: 0, data: &[1.0; 4] }],
//!     tiling: TilingMode::Linear,
//! })?;
//! let uvs: [f32; 6] = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
//! let mut input = BakeInput::new(
//!     &texture,
//!     Indices::U32(&[0, 1, 2]),
//!     TexCoords {
//!         format: TexCoordFormat::Uv32Float,
//!         data: bytemuck::cast_slice(&uvs),
//!         stride: 0,
//!     },
//! );
//! input.max_subdivision_level = 2;
//! let output = bake(&input)?;
//! // A fully opaque texture needs no micromap payload at all.
//! assert!(output.descriptors.is_empty());
//! assert_eq!(output.indices.get(0), omm_cpu::SpecialIndex::FullyOpaque.value());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Features
//!
//! - `multithreading` (enabled by default): rasterize work items in parallel
//!   when the bake sets [`BakeFlags::enable_internal_threads`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(clippy::print_stdout, clippy::print_stderr)]
#![forbid(unsafe_code)]

mod bake;
mod dedup;
mod desc;
mod kernels;
mod serialize;
mod state;
mod workitem;

pub use bake::bake;
pub use desc::{
    BakeFlags, BakeInput, FilterMode, Format, Indices, SamplerDesc, TexCoordFormat, TexCoords,
    UnknownStatePromotion, SUBDIVISION_DISABLED,
};
pub use omm_common::bird::MAX_SUBDIVISION_LEVEL;
pub use omm_common::texture::{
    AddressMode, AlphaTexture, MipDesc, TextureDesc, TextureError, TilingMode,
};
pub use serialize::{BakeOutput, HistogramEntry, IndexData, IndexFormat, OmmDesc};
pub use state::{OpacityState, SpecialIndex};

use thiserror::Error as ThisError;

/// Errors that can abort a bake.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The input descriptor is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Workload validation estimated an unreasonable bake cost.
    #[error("estimated workload exceeds the validation budget")]
    WorkloadTooBig,
    /// The packed micromap array would exceed 2^32 bytes.
    #[error("packed micromap array exceeds 4 GiB")]
    ArrayDataOverflow,
}
