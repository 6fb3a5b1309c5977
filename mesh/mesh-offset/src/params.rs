//! Offset parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Parameters for one offset request.
///
/// Smoothing radii are in voxels; `voxel_size` and `offset` are in world
/// units. A non-positive `voxel_size` is replaced by `|offset| / 3`.
///
/// # Example
///
/// ```
/// use mesh_offset::OffsetParams;
///
/// let params = OffsetParams::default()
///     .with_offset(0.2)
///     .with_voxel_size(0.05)
///     .with_smoothing_after(2, 1.0);
///
/// assert!(params.validate().is_ok());
/// assert_eq!(params.resolved_voxel_size(), 0.05);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OffsetParams {
    /// World units per voxel edge; `<= 0` derives it from the offset.
    pub voxel_size: f64,

    /// Smoothing passes before the offset.
    pub gaussian_it_before: u32,

    /// Kernel radius of the passes before the offset, in voxels.
    pub gaussian_r_before: f32,

    /// Signed world-space offset distance; positive grows the surface.
    pub offset: f64,

    /// Smoothing passes after the offset.
    pub gaussian_it_after: u32,

    /// Kernel radius of the passes after the offset, in voxels.
    pub gaussian_r_after: f32,
}

impl Default for OffsetParams {
    fn default() -> Self {
        Self {
            voxel_size: 0.0,
            gaussian_it_before: 0,
            gaussian_r_before: 1.0,
            offset: 0.0,
            gaussian_it_after: 0,
            gaussian_r_after: 1.0,
        }
    }
}

impl OffsetParams {
    /// Create parameters for a plain offset with an automatic voxel size.
    #[must_use]
    pub fn new(offset: f64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Light smoothing on both sides of the offset.
    ///
    /// One pass of radius 1 before and after; neither crosses the rebuild
    /// threshold.
    #[must_use]
    pub fn preview() -> Self {
        Self {
            gaussian_it_before: 1,
            gaussian_r_before: 1.0,
            gaussian_it_after: 1,
            gaussian_r_after: 1.0,
            ..Self::default()
        }
    }

    /// Heavier smoothing for a clean final surface.
    #[must_use]
    pub fn high_quality() -> Self {
        Self {
            gaussian_it_before: 4,
            gaussian_r_before: 2.0,
            gaussian_it_after: 4,
            gaussian_r_after: 2.0,
            ..Self::default()
        }
    }

    /// Set the voxel size.
    #[must_use]
    pub const fn with_voxel_size(mut self, voxel_size: f64) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    /// Set the offset distance.
    #[must_use]
    pub const fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the smoothing applied before the offset.
    #[must_use]
    pub const fn with_smoothing_before(mut self, iterations: u32, radius: f32) -> Self {
        self.gaussian_it_before = iterations;
        self.gaussian_r_before = radius;
        self
    }

    /// Set the smoothing applied after the offset.
    #[must_use]
    pub const fn with_smoothing_after(mut self, iterations: u32, radius: f32) -> Self {
        self.gaussian_it_after = iterations;
        self.gaussian_r_after = radius;
        self
    }

    /// Voxel size actually used: `voxel_size` if positive, else `|offset| / 3`.
    #[must_use]
    pub fn resolved_voxel_size(&self) -> f64 {
        if self.voxel_size > 0.0 {
            self.voxel_size
        } else {
            self.offset.abs() / 3.0
        }
    }

    /// Check that every value is usable.
    ///
    /// Radii are only checked when their iteration count is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.voxel_size.is_finite() {
            return Err(ValidationError::parameter("voxel_size", "must be finite"));
        }
        if !self.offset.is_finite() {
            return Err(ValidationError::parameter("offset", "must be finite"));
        }
        if self.gaussian_it_before > 0 && !valid_radius(self.gaussian_r_before) {
            return Err(ValidationError::parameter(
                "gaussian_r_before",
                format!("must be positive and finite, got {}", self.gaussian_r_before),
            ));
        }
        if self.gaussian_it_after > 0 && !valid_radius(self.gaussian_r_after) {
            return Err(ValidationError::parameter(
                "gaussian_r_after",
                format!("must be positive and finite, got {}", self.gaussian_r_after),
            ));
        }
        if self.resolved_voxel_size() <= 0.0 {
            return Err(ValidationError::parameter(
                "voxel_size",
                "must be positive when offset is zero",
            ));
        }
        Ok(())
    }
}

fn valid_radius(radius: f32) -> bool {
    radius.is_finite() && radius > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_voxel_size_follows_offset() {
        let params = OffsetParams::new(-0.3);
        assert_relative_eq!(params.resolved_voxel_size(), 0.1);

        let explicit = OffsetParams::new(0.3).with_voxel_size(0.02);
        assert_relative_eq!(explicit.resolved_voxel_size(), 0.02);

        let negative = OffsetParams::new(0.6).with_voxel_size(-1.0);
        assert_relative_eq!(negative.resolved_voxel_size(), 0.2);
    }

    #[test]
    fn presets_validate_with_offset() {
        assert!(OffsetParams::preview().with_offset(0.1).validate().is_ok());
        assert!(OffsetParams::high_quality().with_offset(0.1).validate().is_ok());
    }

    #[test]
    fn zero_offset_needs_explicit_voxel_size() {
        let err = OffsetParams::new(0.0).validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidParameter { name: "voxel_size", .. }
        ));
        assert!(OffsetParams::new(0.0).with_voxel_size(0.1).validate().is_ok());
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(OffsetParams::new(f64::NAN).validate().is_err());
        assert!(OffsetParams::new(0.1)
            .with_voxel_size(f64::INFINITY)
            .validate()
            .is_err());
    }

    #[test]
    fn radius_checked_only_when_used() {
        let unused = OffsetParams::new(0.1).with_smoothing_before(0, -1.0);
        assert!(unused.validate().is_ok());

        let used = OffsetParams::new(0.1).with_smoothing_after(2, 0.0);
        assert!(matches!(
            used.validate(),
            Err(ValidationError::InvalidParameter {
                name: "gaussian_r_after",
                ..
            })
        ));
    }
}
