//! Error types for level-set operations.

use thiserror::Error;

/// Result type for level-set operations.
pub type LevelSetResult<T> = Result<T, LevelSetError>;

/// Errors that can occur while building or transforming a narrow band.
#[derive(Debug, Error)]
pub enum LevelSetError {
    /// Voxel size is zero, negative or not finite.
    #[error("invalid voxel size: {0}")]
    InvalidVoxelSize(f64),

    /// Narrow-band half width is below one voxel or not finite.
    #[error("invalid half width: {0} (must be a finite value >= 1 voxel)")]
    InvalidHalfWidth(f32),

    /// Smoothing radius is not positive and finite.
    #[error("invalid filter radius: {0}")]
    InvalidRadius(f32),

    /// Offset amount is not finite.
    #[error("invalid offset amount: {0}")]
    InvalidAmount(f32),

    /// Input mesh failed validation.
    #[error("invalid mesh: {0}")]
    InvalidMesh(#[from] mesh_types::MeshError),

    /// The band grew past the configured voxel budget.
    #[error("narrow band exceeds voxel budget: {active} active voxels, limit {limit}")]
    VoxelBudgetExceeded {
        /// Voxels the operation needed.
        active: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Extraction produced more vertices than the configured budget.
    #[error("extracted surface too large: {vertices} vertices, limit {limit}")]
    OutputTooLarge {
        /// Vertices the surface needed.
        vertices: usize,
        /// Configured limit.
        limit: usize,
    },
}
