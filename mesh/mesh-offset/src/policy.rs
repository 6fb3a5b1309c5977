//! Band width and rebuild policies.
//!
//! The band must be wide enough to hold the largest perturbation a request
//! makes, whether that is the offset itself or the reach of smoothing.
//! Every rule here is non-decreasing in `|offset|` and in each smoothing
//! reach, so asking for more never yields a narrower band.

use crate::params::OffsetParams;

/// World-space reach of `iterations` diffusion passes of `radius` voxels.
///
/// Reach grows with the square root of the pass count, as for a random walk.
#[must_use]
pub fn smoothing_reach(iterations: u32, radius: f32, voxel_size: f64) -> f64 {
    f64::from(iterations).sqrt() * f64::from(radius) * voxel_size
}

/// Chooses the band half width for a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPolicy {
    /// Lower bound on the half width.
    pub min_half_width: f64,
    /// Multiplier on `|offset|`.
    pub offset_factor: f64,
    /// Multiplier on the largest smoothing reach.
    pub smoothing_factor: f64,
    /// Extra voxels kept beyond the offset distance.
    pub margin_voxels: f64,
}

impl Default for BandPolicy {
    fn default() -> Self {
        Self {
            min_half_width: 5.0,
            offset_factor: 3.0,
            smoothing_factor: 2.0,
            margin_voxels: 3.0,
        }
    }
}

impl BandPolicy {
    /// `max(5, 3·|offset|, 2·max(reach_before, reach_after))`.
    ///
    /// Offset and reach enter in world units, as requested.
    #[must_use]
    pub fn half_width(&self, params: &OffsetParams, voxel_size: f64) -> f64 {
        let reach_before =
            smoothing_reach(params.gaussian_it_before, params.gaussian_r_before, voxel_size);
        let reach_after =
            smoothing_reach(params.gaussian_it_after, params.gaussian_r_after, voxel_size);

        self.min_half_width
            .max(self.offset_factor * params.offset.abs())
            .max(self.smoothing_factor * reach_before.max(reach_after))
    }

    /// Band half width in voxels used by the pipeline.
    ///
    /// Extends [`half_width`](Self::half_width) so the band always covers
    /// the offset distance plus a margin, and twice the smoothing reach,
    /// measured in voxels.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn voxel_half_width(&self, params: &OffsetParams, voxel_size: f64) -> f32 {
        let offset_voxels = params.offset.abs() / voxel_size + self.margin_voxels;
        let reach_voxels = smoothing_reach(params.gaussian_it_before, params.gaussian_r_before, 1.0)
            .max(smoothing_reach(params.gaussian_it_after, params.gaussian_r_after, 1.0));

        self.half_width(params, voxel_size)
            .max(offset_voxels)
            .max(self.smoothing_factor * reach_voxels) as f32
    }
}

/// Decides when smoothing has drifted the field enough to reinitialize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebuildPolicy {
    /// Rebuild when `iterations · radius²` exceeds this.
    pub threshold: f64,
}

impl Default for RebuildPolicy {
    fn default() -> Self {
        Self { threshold: 15.0 }
    }
}

impl RebuildPolicy {
    /// Whether `iterations` passes of `radius` call for a rebuild.
    #[must_use]
    pub fn should_rebuild(&self, iterations: u32, radius: f32) -> bool {
        let r = f64::from(radius);
        f64::from(iterations) * r * r > self.threshold
    }
}
