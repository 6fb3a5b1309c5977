//! Two-phase result retrieval over flat buffers.
//!
//! [`create`] validates raw input buffers, runs the pipeline and returns an
//! [`OffsetHandle`] that owns the result. Callers read the output sizes
//! from [`OffsetHandle::counts`], allocate, then copy the result out with
//! [`OffsetHandle::fetch`]. The handle keeps the result until
//! [`OffsetHandle::release`] or [`OffsetHandle::into_output`] consumes it.
//!
//! # Example
//!
//! ```
//! use mesh_offset::{MeshBuffers, OffsetParams, OutputBuffers, create};
//! use mesh_types::unit_cube;
//!
//! let cube = unit_cube();
//! let positions = cube.positions_f32();
//! let indices: Vec<i32> = cube.faces.iter().flatten().map(|&i| i as i32).collect();
//!
//! let params = OffsetParams::new(0.2).with_voxel_size(0.1);
//! let handle = create(&MeshBuffers::new(&positions, &indices), &params).unwrap();
//!
//! let counts = handle.counts();
//! let mut verts = vec![0.0_f32; counts.vertices * 3];
//! let mut tris = vec![0_i32; counts.triangles * 3];
//! let written = handle.fetch(OutputBuffers::new(&mut verts, &mut tris)).unwrap();
//! assert_eq!(written, counts);
//!
//! handle.release();
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use mesh_levelset::{LevelSetError, Reinitialize};
use mesh_types::IndexedMesh;
use tracing::debug;

use crate::error::{OffsetError, OffsetResult, ValidationError};
use crate::params::OffsetParams;
use crate::pipeline::{OffsetOutput, OffsetPipeline, PipelineReport};

/// Borrowed input mesh in flat interchange layout.
///
/// `None` buffers and signed counts mirror what a foreign caller can pass;
/// both are checked before any computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshBuffers<'a> {
    /// `[x0, y0, z0, x1, ...]`, at least `3 * vertex_count` values.
    pub vertices: Option<&'a [f32]>,
    /// Number of vertices to read.
    pub vertex_count: i32,
    /// `[a0, b0, c0, a1, ...]`, at least `3 * triangle_count` values.
    pub triangles: Option<&'a [i32]>,
    /// Number of triangles to read.
    pub triangle_count: i32,
}

impl<'a> MeshBuffers<'a> {
    /// Wrap complete buffers; counts are derived from the lengths.
    #[must_use]
    pub fn new(vertices: &'a [f32], triangles: &'a [i32]) -> Self {
        Self {
            vertices: Some(vertices),
            vertex_count: saturating_count(vertices.len()),
            triangles: Some(triangles),
            triangle_count: saturating_count(triangles.len()),
        }
    }

    /// Validate the buffers and build a mesh from them.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for missing buffers, negative counts,
    /// short buffers, non-finite coordinates or out-of-range indices.
    pub fn to_mesh(&self) -> Result<IndexedMesh, ValidationError> {
        let vertices = self
            .vertices
            .ok_or(ValidationError::MissingBuffer("vertices"))?;
        let triangles = self
            .triangles
            .ok_or(ValidationError::MissingBuffer("triangles"))?;

        let vertex_values = required_len("vertices", self.vertex_count, vertices.len())?;
        let index_values = required_len("triangles", self.triangle_count, triangles.len())?;

        Ok(IndexedMesh::from_flat(
            &vertices[..vertex_values],
            &triangles[..index_values],
        )?)
    }
}

fn saturating_count(len: usize) -> i32 {
    i32::try_from(len / 3).unwrap_or(i32::MAX)
}

/// Values needed for `count` triples, checked against `len`.
fn required_len(buffer: &'static str, count: i32, len: usize) -> Result<usize, ValidationError> {
    let count =
        usize::try_from(count).map_err(|_| ValidationError::NegativeCount { buffer, count })?;
    let required = count * 3;
    if len < required {
        return Err(ValidationError::BufferTooShort {
            buffer,
            len,
            required,
        });
    }
    Ok(required)
}

/// Caller-owned output buffers.
#[derive(Debug, Default)]
pub struct OutputBuffers<'a> {
    /// Receives `[x0, y0, z0, ...]`.
    pub vertices: Option<&'a mut [f32]>,
    /// Vertices the caller can accept.
    pub vertex_capacity: i32,
    /// Receives `[a0, b0, c0, ...]`.
    pub triangles: Option<&'a mut [i32]>,
    /// Triangles the caller can accept.
    pub triangle_capacity: i32,
}

impl<'a> OutputBuffers<'a> {
    /// Wrap buffers; capacities are derived from the lengths.
    #[must_use]
    pub fn new(vertices: &'a mut [f32], triangles: &'a mut [i32]) -> Self {
        let vertex_capacity = saturating_count(vertices.len());
        let triangle_capacity = saturating_count(triangles.len());
        Self {
            vertices: Some(vertices),
            vertex_capacity,
            triangles: Some(triangles),
            triangle_capacity,
        }
    }
}

/// Output sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCounts {
    /// Vertices in the result.
    pub vertices: usize,
    /// Triangles in the result.
    pub triangles: usize,
}

/// Owns a pipeline result until the caller releases it.
#[derive(Debug)]
pub struct OffsetHandle {
    output: OffsetOutput,
}

impl OffsetHandle {
    /// Output sizes, known without copying anything.
    #[must_use]
    pub fn counts(&self) -> OutputCounts {
        OutputCounts {
            vertices: self.output.mesh.vertex_count(),
            triangles: self.output.mesh.face_count(),
        }
    }

    /// Statistics from the run that produced this result.
    #[must_use]
    pub const fn report(&self) -> &PipelineReport {
        &self.output.report
    }

    /// The result mesh.
    #[must_use]
    pub const fn mesh(&self) -> &IndexedMesh {
        &self.output.mesh
    }

    /// Copy the result into caller buffers.
    ///
    /// Nothing is written unless both buffers can hold the whole result.
    /// The handle stays valid, so a failed fetch can be retried with
    /// larger buffers.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing buffer or negative capacity,
    /// and [`OffsetError::CapacityTooSmall`] if either buffer is too small.
    pub fn fetch(&self, out: OutputBuffers<'_>) -> OffsetResult<OutputCounts> {
        let vertices = out
            .vertices
            .ok_or(ValidationError::MissingOutput("vertices"))?;
        let triangles = out
            .triangles
            .ok_or(ValidationError::MissingOutput("triangles"))?;

        let vertex_capacity = capacity("vertices", out.vertex_capacity, vertices.len())?;
        let triangle_capacity = capacity("triangles", out.triangle_capacity, triangles.len())?;

        let counts = self.counts();
        if counts.vertices > vertex_capacity || counts.triangles > triangle_capacity {
            return Err(OffsetError::CapacityTooSmall {
                required_vertices: counts.vertices,
                required_triangles: counts.triangles,
                vertex_capacity,
                triangle_capacity,
            });
        }

        let mesh = &self.output.mesh;
        for (dst, v) in vertices.chunks_exact_mut(3).zip(&mesh.vertices) {
            dst.copy_from_slice(&v.to_f32());
        }
        for (dst, face) in triangles.chunks_exact_mut(3).zip(&mesh.faces) {
            for (slot, &index) in dst.iter_mut().zip(face) {
                // Counts were bounded to i32 when the handle was created
                *slot = i32::try_from(index).unwrap_or(i32::MAX);
            }
        }

        debug!(
            "Fetched {} vertices, {} triangles",
            counts.vertices, counts.triangles
        );
        Ok(counts)
    }

    /// Take ownership of the result.
    #[must_use]
    pub fn into_output(self) -> OffsetOutput {
        self.output
    }

    /// Free the result.
    pub fn release(self) {
        debug!("Released offset result ({} triangles)", self.output.mesh.face_count());
    }
}

/// Usable capacity: the declared value, bounded by the real buffer length.
fn capacity(buffer: &'static str, declared: i32, len: usize) -> Result<usize, ValidationError> {
    let declared = usize::try_from(declared)
        .map_err(|_| ValidationError::NegativeCapacity {
            buffer,
            capacity: declared,
        })?;
    Ok(declared.min(len / 3))
}

/// Validate flat buffers, run the offset pipeline and keep the result.
///
/// # Errors
///
/// Returns validation errors before any computation, computation errors
/// from the pipeline, and [`OffsetError::Unknown`] if a stage panics.
pub fn create(mesh: &MeshBuffers<'_>, params: &OffsetParams) -> OffsetResult<OffsetHandle> {
    create_with(mesh, &OffsetPipeline::new(*params))
}

/// [`create`] with a preconfigured pipeline.
///
/// # Errors
///
/// See [`create`].
pub fn create_with<R: Reinitialize>(
    mesh: &MeshBuffers<'_>,
    pipeline: &OffsetPipeline<R>,
) -> OffsetResult<OffsetHandle> {
    let mesh = mesh.to_mesh()?;
    pipeline.params().validate()?;

    let output = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&mesh)))
        .map_err(|payload| OffsetError::Unknown(panic_message(payload.as_ref())))??;

    let limit = usize::try_from(i32::MAX).unwrap_or(usize::MAX);
    if output.mesh.vertex_count() > limit || output.mesh.face_count() > limit {
        return Err(LevelSetError::OutputTooLarge {
            vertices: output.mesh.vertex_count(),
            limit,
        }
        .into());
    }

    Ok(OffsetHandle { output })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic in offset pipeline".to_string())
}
