// Copyright 2025 the OMM Baker Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate includes the geometry, micro-triangle enumeration, texture sampling and
//! conservative rasterization primitives used by the opacity micromap CPU baker.
//!
//! # Usage
//!
//! This crate should not be used on its own; it acts as a foundation for `omm_cpu`,
//! which implements the actual bake pipeline on top of these primitives.
//!
//! # Contents
//!
//! - Small 2-D vector types and Morton encoding ([`math`])
//! - UV triangles with winding and degeneracy classification ([`geometry`])
//! - The bird-curve enumeration of micro-triangles ([`bird`])
//! - An owned alpha texture view with tiled storage and the runtime sampler
//!   address modes ([`texture`])
//! - Serial conservative rasterization over an integer grid ([`raster`])
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(clippy::print_stdout, clippy::print_stderr)]
#![forbid(unsafe_code)]

pub mod bird;
pub mod geometry;
pub mod math;
pub mod raster;
pub mod texture;
