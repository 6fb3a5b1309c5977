//! Error types for mesh construction.

use thiserror::Error;

/// Result type for mesh construction.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors raised while building a mesh from raw data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    /// A flat buffer does not hold a whole number of triples.
    #[error("{buffer} buffer length {len} is not a multiple of 3")]
    MalformedBuffer {
        /// Which buffer was malformed.
        buffer: &'static str,
        /// Its length.
        len: usize,
    },

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        /// Face index.
        face: usize,
        /// Offending vertex index.
        index: i64,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("vertex {vertex} has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Vertex index.
        vertex: usize,
    },
}
