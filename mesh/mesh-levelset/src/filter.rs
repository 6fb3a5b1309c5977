//! In-band filters: diffusion smoothing and constant offset.
//!
//! Both operators touch active voxels only and leave band membership
//! unchanged. Neither restores the unit-gradient property; callers
//! reinitialize afterwards when the field has drifted.

use tracing::debug;

use crate::error::{LevelSetError, LevelSetResult};
use crate::grid::NarrowBandGrid;

/// Normalized binomial weights of length `2 * radius + 1`.
///
/// The binomial distribution `C(2R, R + k)` has variance `R / 2` and is the
/// discrete analogue of a Gaussian on an integer lattice.
fn binomial_weights(radius: usize) -> Vec<f64> {
    let n = 2 * radius;
    let mut weights = Vec::with_capacity(n + 1);
    let mut w = 1.0_f64;
    for i in 0..=n {
        weights.push(w);
        #[allow(clippy::cast_precision_loss)]
        let ratio = (n - i) as f64 / (i + 1) as f64;
        w *= ratio;
    }
    let total: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= total);
    weights
}

/// One pass of Gaussian smoothing with a kernel of `radius` voxels.
///
/// The kernel is separable: each axis is filtered in turn, reading the
/// values produced by the previous axis. Inactive neighbors contribute
/// their background value `±half_width`. Results are clamped to the band.
///
/// # Errors
///
/// Returns [`LevelSetError::InvalidRadius`] if `radius` is not positive
/// and finite.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
pub fn gaussian(grid: &mut NarrowBandGrid, radius: f32) -> LevelSetResult<()> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(LevelSetError::InvalidRadius(radius));
    }

    let extent = (radius.round() as usize).max(1);
    let weights = binomial_weights(extent);
    let extent = extent as i32;

    for axis in 0..3 {
        grid.update_active_par(|g, coord, _| {
            let sum: f64 = weights
                .iter()
                .zip(-extent..=extent)
                .map(|(w, k)| w * f64::from(g.value(coord.shifted(axis, k))))
                .sum();
            sum as f32
        });
    }
    grid.clamp_to_band();
    Ok(())
}

/// Apply [`gaussian`] `iterations` times. Zero iterations leaves the grid untouched.
///
/// # Errors
///
/// Returns [`LevelSetError::InvalidRadius`] if `iterations > 0` and the
/// radius is invalid.
pub fn smooth(grid: &mut NarrowBandGrid, iterations: u32, radius: f32) -> LevelSetResult<()> {
    if iterations == 0 {
        return Ok(());
    }
    debug!("Smoothing: {} iterations, radius {}", iterations, radius);
    for _ in 0..iterations {
        gaussian(grid, radius)?;
    }
    Ok(())
}

/// Subtract `amount` from every active value.
///
/// With negative-inside distances this moves the zero level outward by
/// `amount` voxels; a negative amount moves it inward.
///
/// # Errors
///
/// Returns [`LevelSetError::InvalidAmount`] if `amount` is not finite.
pub fn offset(grid: &mut NarrowBandGrid, amount: f32) -> LevelSetResult<()> {
    if !amount.is_finite() {
        return Err(LevelSetError::InvalidAmount(amount));
    }
    let hw = grid.half_width();
    grid.for_each_active_mut(|_, v| *v = (*v - amount).clamp(-hw, hw));
    Ok(())
}
