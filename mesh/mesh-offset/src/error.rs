//! Error types for mesh offset operations.
//!
//! Every failure maps to one of four categories so callers can tell
//! "fix your inputs" from "fix your buffers" from "internal failure".
//! [`OffsetError::code`] gives the stable integer code for each.

use mesh_levelset::LevelSetError;
use mesh_types::MeshError;
use thiserror::Error;

/// Result type for offset operations.
pub type OffsetResult<T> = Result<T, OffsetError>;

/// Coarse classification of an [`OffsetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed inputs, rejected before any computation.
    Validation,
    /// Caller-provided output buffers are too small.
    Capacity,
    /// A pipeline stage failed.
    Computation,
    /// Unclassified failure, such as a panic inside a stage.
    Unknown,
}

/// Input problems detected before the pipeline runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A parameter is out of range or not finite.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A required input buffer was not supplied.
    #[error("missing input buffer `{0}`")]
    MissingBuffer(&'static str),

    /// An element count is negative.
    #[error("negative count for `{buffer}`: {count}")]
    NegativeCount {
        /// Buffer the count describes.
        buffer: &'static str,
        /// Supplied count.
        count: i32,
    },

    /// An input buffer holds fewer values than its count requires.
    #[error("buffer `{buffer}` too short: {len} values, need {required}")]
    BufferTooShort {
        /// Buffer name.
        buffer: &'static str,
        /// Values supplied.
        len: usize,
        /// Values required.
        required: usize,
    },

    /// Mesh contents are invalid (bad index or non-finite coordinate).
    #[error("invalid mesh: {0}")]
    InvalidMesh(#[from] MeshError),

    /// A required output buffer was not supplied.
    #[error("missing output buffer `{0}`")]
    MissingOutput(&'static str),

    /// An output capacity is negative.
    #[error("negative capacity for `{buffer}`: {capacity}")]
    NegativeCapacity {
        /// Buffer the capacity describes.
        buffer: &'static str,
        /// Supplied capacity.
        capacity: i32,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidParameter`].
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during mesh offset.
#[derive(Debug, Error)]
pub enum OffsetError {
    /// Inputs were rejected before computation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Output buffers cannot hold the result. Nothing was written.
    #[error(
        "output capacity too small: need {required_vertices} vertices / {required_triangles} triangles, \
         have {vertex_capacity} / {triangle_capacity}"
    )]
    CapacityTooSmall {
        /// Vertices in the result.
        required_vertices: usize,
        /// Triangles in the result.
        required_triangles: usize,
        /// Vertices the caller can accept.
        vertex_capacity: usize,
        /// Triangles the caller can accept.
        triangle_capacity: usize,
    },

    /// A level-set stage failed.
    #[error("level-set stage failed: {0}")]
    LevelSet(#[from] LevelSetError),

    /// The worker pool could not be created.
    #[error("runtime initialization failed: {0}")]
    Runtime(String),

    /// Unclassified failure.
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl OffsetError {
    /// Category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::LevelSet(LevelSetError::InvalidMesh(_)) => {
                ErrorCategory::Validation
            }
            Self::CapacityTooSmall { .. } => ErrorCategory::Capacity,
            Self::LevelSet(_) | Self::Runtime(_) => ErrorCategory::Computation,
            Self::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Stable integer code.
    ///
    /// | Code | Meaning |
    /// |---|---|
    /// | 1 | invalid parameter |
    /// | 2 | missing input buffer |
    /// | 3 | negative count, short buffer or invalid mesh |
    /// | 4 | missing output buffer |
    /// | 5 | negative output capacity |
    /// | 6 | output capacity too small |
    /// | 100 | computation failure |
    /// | 101 | unknown failure |
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Validation(v) => match v {
                ValidationError::InvalidParameter { .. } => 1,
                ValidationError::MissingBuffer(_) => 2,
                ValidationError::NegativeCount { .. }
                | ValidationError::BufferTooShort { .. }
                | ValidationError::InvalidMesh(_) => 3,
                ValidationError::MissingOutput(_) => 4,
                ValidationError::NegativeCapacity { .. } => 5,
            },
            Self::LevelSet(LevelSetError::InvalidMesh(_)) => 3,
            Self::CapacityTooSmall { .. } => 6,
            Self::LevelSet(_) | Self::Runtime(_) => 100,
            Self::Unknown(_) => 101,
        }
    }
}
