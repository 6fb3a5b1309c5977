//! Sparse narrow-band level sets for triangle meshes.
//!
//! This crate stores a signed distance field only near a surface and
//! provides the operators needed to offset that surface:
//!
//! - [`mesh_to_level_set`] - Rasterize a triangle mesh into a band
//! - [`gaussian`] / [`smooth`] - Diffusion smoothing inside the band
//! - [`offset`] - Shift the zero level along its normal
//! - [`Reinitialize`] / [`rebuild`] - Restore true distances around the zero level
//! - [`extract_surface`] - Recover a quad surface at an isovalue
//!
//! # Conventions
//!
//! Distances are stored in **voxel units** and are negative inside.
//! Voxel `(i, j, k)` samples world point `(i, j, k) * voxel_size`.
//! Memory scales with the number of voxels in the band, not with the
//! volume of the bounding box.
//!
//! # Example
//!
//! ```
//! use mesh_levelset::{
//!     ExtractConfig, RasterizeConfig, extract_surface, mesh_to_level_set, offset, rebuild,
//! };
//! use mesh_types::unit_cube;
//!
//! let config = RasterizeConfig::default().with_half_width(5.0);
//! let (mut grid, _) = mesh_to_level_set(&unit_cube(), 0.1, &config).unwrap();
//!
//! // Grow by one voxel, then repair the distance field
//! offset(&mut grid, 1.0).unwrap();
//! let grid = rebuild(&grid, 0.0, 5.0).unwrap();
//!
//! let mesh = extract_surface(&grid, &ExtractConfig::default()).unwrap().into_mesh();
//! assert!(mesh.signed_volume() > 1.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod extract;
mod filter;
mod grid;
mod rasterize;
mod rebuild;

pub use error::{LevelSetError, LevelSetResult};
pub use extract::{ExtractConfig, IsoSurface, extract_surface};
pub use filter::{gaussian, offset, smooth};
pub use grid::{Coord, LEAF_DIM, LEAF_LOG2, NarrowBandGrid};
pub use rasterize::{RasterizeConfig, RasterizeStats, mesh_to_level_set};
pub use rebuild::{FastMarchingRebuild, Reinitialize, rebuild};
