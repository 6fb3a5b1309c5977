//! Mesh offsetting through narrow-band level sets.
//!
//! This crate grows or shrinks a closed triangle mesh by a world-space
//! distance. The mesh is rasterized into a sparse signed distance band,
//! optionally smoothed, shifted, reinitialized and finally re-extracted
//! as a new surface.
//!
//! # Overview
//!
//! - [`OffsetParams`] - Request parameters, with presets and builders
//! - [`OffsetPipeline`] - Runs the stages in their fixed order
//! - [`BandPolicy`] / [`RebuildPolicy`] - Band width and rebuild rules
//! - [`create`] / [`OffsetHandle`] - Two-phase retrieval into flat buffers
//! - [`runtime`] - Process-wide worker pool setup and teardown
//!
//! Positive offsets expand the mesh outward (dilation), negative offsets
//! shrink it inward (erosion). Smoothing radii are given in voxels.
//!
//! # Example
//!
//! ```
//! use mesh_offset::{OffsetParams, offset_mesh};
//! use mesh_types::unit_cube;
//!
//! let params = OffsetParams::new(0.2).with_voxel_size(0.1);
//! let grown = offset_mesh(&unit_cube(), &params).unwrap();
//! assert!(grown.signed_volume() > 1.0);
//! ```
//!
//! # Quality vs Performance
//!
//! - `OffsetParams::default()` - No smoothing, voxel size derived from the offset
//! - `OffsetParams::preview()` - One light smoothing pass on each side
//! - `OffsetParams::high_quality()` - Heavier smoothing, with reinitialization

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod handle;
mod params;
mod pipeline;
mod policy;
pub mod runtime;

pub use error::{ErrorCategory, OffsetError, OffsetResult, ValidationError};
pub use handle::{
    MeshBuffers, OffsetHandle, OutputBuffers, OutputCounts, create, create_with,
};
pub use params::OffsetParams;
pub use pipeline::{OffsetOutput, OffsetPipeline, PipelineReport, Stage, offset_mesh};
pub use policy::{BandPolicy, RebuildPolicy, smoothing_reach};

// Re-export the level-set seam so callers can plug in their own reinitializer
pub use mesh_levelset::{
    ExtractConfig, FastMarchingRebuild, LevelSetError, NarrowBandGrid, Reinitialize,
};
