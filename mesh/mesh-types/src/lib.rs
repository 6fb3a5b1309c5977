//! Core mesh types for the offset workspace.
//!
//! This crate provides the foundational types shared by the level-set
//! crates:
//!
//! - [`Vertex`] - A point in 3D space
//! - [`IndexedMesh`] - A triangle mesh with indexed vertices
//! - [`Triangle`] - A concrete triangle with vertex positions
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64` internally;
//! the flat-buffer constructors accept and emit `f32` to match the usual
//! interchange layout of `[x0, y0, z0, x1, ...]`.
//!
//! # Winding
//!
//! Face winding is **counter-clockwise (CCW) when viewed from outside**.
//! Normals point outward by the right-hand rule, so a closed, correctly
//! wound mesh has a positive [`IndexedMesh::signed_volume`].
//!
//! # Example
//!
//! ```
//! use mesh_types::{IndexedMesh, Vertex};
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
//! mesh.faces.push([0, 1, 2]);
//!
//! assert_eq!(mesh.face_count(), 1);
//! assert!(!mesh.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod mesh;
mod triangle;
mod vertex;

pub use error::{MeshError, MeshResult};
pub use mesh::{IndexedMesh, unit_cube};
pub use triangle::Triangle;
pub use vertex::Vertex;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
