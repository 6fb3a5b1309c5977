//! Indexed triangle mesh.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};
use crate::{Triangle, Vertex};

/// An indexed triangle mesh.
///
/// Faces reference vertices by index. No manifoldness is required:
/// duplicate, degenerate and non-manifold faces are all representable.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// assert_eq!(mesh.vertex_count(), 3);
/// assert_eq!(mesh.face_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    pub faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    #[inline]
    #[must_use]
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
        }
    }

    /// Create a mesh from vertices and faces without validation.
    #[inline]
    #[must_use]
    pub const fn from_parts(vertices: Vec<Vertex>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Build a mesh from flat interchange buffers.
    ///
    /// `positions` is `[x0, y0, z0, x1, ...]`, `indices` is
    /// `[a0, b0, c0, a1, ...]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer length is not a multiple of 3, a
    /// coordinate is not finite, or an index is outside the vertex range.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::IndexedMesh;
    ///
    /// let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    /// let mesh = IndexedMesh::from_flat(&positions, &[0, 1, 2]).unwrap();
    /// assert_eq!(mesh.face_count(), 1);
    ///
    /// assert!(IndexedMesh::from_flat(&positions, &[0, 1, 3]).is_err());
    /// ```
    pub fn from_flat(positions: &[f32], indices: &[i32]) -> MeshResult<Self> {
        if positions.len() % 3 != 0 {
            return Err(MeshError::MalformedBuffer {
                buffer: "positions",
                len: positions.len(),
            });
        }
        if indices.len() % 3 != 0 {
            return Err(MeshError::MalformedBuffer {
                buffer: "indices",
                len: indices.len(),
            });
        }

        let vertices: Vec<Vertex> = positions
            .chunks_exact(3)
            .map(|c| Vertex::from_f32([c[0], c[1], c[2]]))
            .collect();

        let vertex_count = vertices.len();
        let mut faces = Vec::with_capacity(indices.len() / 3);
        for (face, tri) in indices.chunks_exact(3).enumerate() {
            let mut resolved = [0u32; 3];
            for (slot, &index) in resolved.iter_mut().zip(tri) {
                *slot = u32::try_from(index)
                    .ok()
                    .filter(|&i| (i as usize) < vertex_count)
                    .ok_or(MeshError::IndexOutOfRange {
                        face,
                        index: i64::from(index),
                        vertex_count,
                    })?;
            }
            faces.push(resolved);
        }

        let mesh = Self { vertices, faces };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Check that every coordinate is finite and every index is in range.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> MeshResult<()> {
        if let Some(vertex) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(MeshError::NonFiniteCoordinate { vertex });
        }
        let vertex_count = self.vertices.len();
        for (face, tri) in self.faces.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::IndexOutOfRange {
                    face,
                    index: i64::from(index),
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// A mesh is empty when it has no vertices or no faces.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Resolve a face into a concrete triangle.
    ///
    /// Returns `None` if the face index or one of its vertex indices is out
    /// of range.
    #[must_use]
    pub fn triangle(&self, face_index: usize) -> Option<Triangle> {
        let [a, b, c] = *self.faces.get(face_index)?;
        Some(Triangle::new(
            self.vertices.get(a as usize)?.position,
            self.vertices.get(b as usize)?.position,
            self.vertices.get(c as usize)?.position,
        ))
    }

    /// Iterate over all resolvable triangles.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.faces.len()).filter_map(|i| self.triangle(i))
    }

    /// Signed volume by the divergence theorem.
    ///
    /// Positive for a closed mesh with outward-facing normals.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|tri| {
                let cross: Vector3<f64> = tri.v1.coords.cross(&tri.v2.coords);
                tri.v0.coords.dot(&cross)
            })
            .sum::<f64>()
            / 6.0
    }

    /// Flatten vertex positions into `[x0, y0, z0, ...]` single precision.
    #[must_use]
    pub fn positions_f32(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(Vertex::to_f32).collect()
    }

    /// Translate all vertices.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for vertex in &mut self.vertices {
            vertex.position += offset;
        }
    }

    /// Reverse the winding of every face.
    pub fn flip_normals(&mut self) {
        for face in &mut self.faces {
            face.swap(1, 2);
        }
    }
}

/// Create a unit cube spanning `[0, 1]^3` with outward CCW winding.
///
/// 8 vertices, 12 triangles.
#[must_use]
pub fn unit_cube() -> IndexedMesh {
    let mut mesh = IndexedMesh::with_capacity(8, 12);

    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0)); // 1
    mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0)); // 2
    mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0)); // 3
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0)); // 4
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 1.0)); // 5
    mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 1.0)); // 6
    mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 1.0)); // 7

    // Bottom (z=0), -Z
    mesh.faces.push([0, 2, 1]);
    mesh.faces.push([0, 3, 2]);
    // Top (z=1), +Z
    mesh.faces.push([4, 5, 6]);
    mesh.faces.push([4, 6, 7]);
    // Front (y=0), -Y
    mesh.faces.push([0, 1, 5]);
    mesh.faces.push([0, 5, 4]);
    // Back (y=1), +Y
    mesh.faces.push([3, 7, 6]);
    mesh.faces.push([3, 6, 2]);
    // Left (x=0), -X
    mesh.faces.push([0, 4, 7]);
    mesh.faces.push([0, 7, 3]);
    // Right (x=1), +X
    mesh.faces.push([1, 2, 6]);
    mesh.faces.push([1, 6, 5]);

    mesh
}
