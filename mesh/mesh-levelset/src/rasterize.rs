//! Mesh to narrow-band signed distance conversion.
//!
//! Unsigned distances are computed by scattering each triangle into the
//! voxels within `half_width` of it. Signs come from the nonzero winding
//! rule along the three grid axes with a majority vote, which tolerates
//! small holes, grazing hits and overlapping shells better than a single
//! ray direction.

use hashbrown::HashMap;
use mesh_types::{IndexedMesh, Triangle};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::{LevelSetError, LevelSetResult};
use crate::grid::{Coord, NarrowBandGrid};

/// Edge length, in voxels, of the 2D bins used to cull ray candidates.
const RAY_BIN_SIZE: f64 = 8.0;

/// Sub-voxel ray offsets that keep rays off mesh edges and vertices
/// placed on voxel centers.
const RAY_JITTER: (f64, f64) = (1.234e-4, 2.718e-4);

/// Hits closer than this (in voxels) along one ray count once.
const HIT_MERGE_EPSILON: f64 = 1e-6;

/// Configuration for [`mesh_to_level_set`].
#[derive(Debug, Clone)]
pub struct RasterizeConfig {
    /// Band half width in voxels.
    pub half_width: f32,
    /// Upper bound on active voxels before the conversion gives up.
    pub max_active_voxels: usize,
    /// Triangles with an area (in squared voxels) at or below this are skipped.
    pub degenerate_area_epsilon: f64,
}

impl Default for RasterizeConfig {
    fn default() -> Self {
        Self {
            half_width: 3.0,
            max_active_voxels: 50_000_000,
            degenerate_area_epsilon: 1e-12,
        }
    }
}

impl RasterizeConfig {
    /// Set the band half width.
    #[must_use]
    pub const fn with_half_width(mut self, half_width: f32) -> Self {
        self.half_width = half_width;
        self
    }

    /// Set the active voxel budget.
    #[must_use]
    pub const fn with_max_active_voxels(mut self, limit: usize) -> Self {
        self.max_active_voxels = limit;
        self
    }
}

/// Statistics from a rasterization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterizeStats {
    /// Triangles that contributed to the band.
    pub triangles: usize,
    /// Zero-area triangles that were ignored.
    pub skipped_degenerate: usize,
    /// Active voxels in the resulting grid.
    pub active_voxels: usize,
}

/// Convert a closed triangle mesh into a narrow-band signed distance grid.
///
/// Voxel `(i, j, k)` samples the world point `(i, j, k) * voxel_size`.
/// Values are in voxel units, negative inside.
///
/// # Errors
///
/// Returns an error if the mesh fails validation, the voxel size or half
/// width is invalid, or the band would exceed `config.max_active_voxels`.
///
/// # Example
///
/// ```
/// use mesh_levelset::{Coord, RasterizeConfig, mesh_to_level_set};
/// use mesh_types::unit_cube;
///
/// let (grid, stats) = mesh_to_level_set(&unit_cube(), 0.1, &RasterizeConfig::default()).unwrap();
/// assert_eq!(stats.triangles, 12);
/// assert!(grid.value(Coord::new(5, 5, 5)) < 0.0);
/// assert!(grid.value(Coord::new(-5, 5, 5)) > 0.0);
/// ```
pub fn mesh_to_level_set(
    mesh: &IndexedMesh,
    voxel_size: f64,
    config: &RasterizeConfig,
) -> LevelSetResult<(NarrowBandGrid, RasterizeStats)> {
    let mut grid = NarrowBandGrid::new(voxel_size, config.half_width)?;
    mesh.validate()?;

    let mut stats = RasterizeStats::default();
    let triangles: Vec<Triangle> = mesh
        .triangles()
        .map(|t| {
            Triangle::new(
                grid.world_to_index(&t.v0),
                grid.world_to_index(&t.v1),
                grid.world_to_index(&t.v2),
            )
        })
        .filter(|t| {
            let keep = !t.is_degenerate(config.degenerate_area_epsilon);
            if !keep {
                stats.skipped_degenerate += 1;
            }
            keep
        })
        .collect();
    stats.triangles = triangles.len();

    if stats.skipped_degenerate > 0 {
        warn!(
            "Skipped {} degenerate triangles during rasterization",
            stats.skipped_degenerate
        );
    }
    if triangles.is_empty() {
        debug!("No usable triangles, returning empty grid");
        return Ok((grid, stats));
    }

    let half_width = f64::from(config.half_width);

    // Early rejection from the band volume swept by the surface
    let total_area: f64 = triangles.iter().map(Triangle::area).sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let estimate = (total_area * 2.0 * half_width) as usize;
    if estimate > config.max_active_voxels {
        return Err(LevelSetError::VoxelBudgetExceeded {
            active: estimate,
            limit: config.max_active_voxels,
        });
    }

    let distances = unsigned_band(&triangles, half_width);
    if distances.len() > config.max_active_voxels {
        return Err(LevelSetError::VoxelBudgetExceeded {
            active: distances.len(),
            limit: config.max_active_voxels,
        });
    }

    let coords: Vec<Coord> = distances.keys().copied().collect();
    let inside = classify_inside(&triangles, &coords);

    for (coord, is_inside) in coords.iter().zip(inside) {
        let Some(&distance) = distances.get(coord) else {
            continue;
        };
        #[allow(clippy::cast_possible_truncation)]
        let magnitude = (distance as f32).min(config.half_width);
        grid.set_value(*coord, if is_inside { -magnitude } else { magnitude });
    }
    grid.signed_flood_fill();

    stats.active_voxels = grid.active_voxel_count();
    debug!(
        "Rasterized {} triangles into {} active voxels ({} leaves)",
        stats.triangles,
        stats.active_voxels,
        grid.leaf_count()
    );

    Ok((grid, stats))
}

/// Minimum unsigned distance for every voxel closer than `half_width` to
/// some triangle.
fn unsigned_band(triangles: &[Triangle], half_width: f64) -> HashMap<Coord, f64> {
    triangles
        .par_iter()
        .fold(HashMap::new, |mut acc, tri| {
            scatter_triangle(tri, half_width, &mut acc);
            acc
        })
        .reduce(HashMap::new, |a, b| {
            let (mut large, small) = if a.len() >= b.len() { (a, b) } else { (b, a) };
            for (coord, d) in small {
                large
                    .entry(coord)
                    .and_modify(|e| *e = e.min(d))
                    .or_insert(d);
            }
            large
        })
}

/// Scatter one triangle into the voxels within `half_width` of it.
///
/// Columns run along the dominant normal axis and are clipped to the
/// slab `|n·p - plane| <= half_width`, so the work is proportional to the
/// band around the triangle rather than its bounding box.
#[allow(clippy::cast_possible_truncation)]
fn scatter_triangle(tri: &Triangle, half_width: f64, acc: &mut HashMap<Coord, f64>) {
    let Some(normal) = tri.normal() else {
        return;
    };
    let plane = normal.dot(&tri.v0.coords);
    let lo = tri.min_corner();
    let hi = tri.max_corner();
    let hw_sq = half_width * half_width;

    let range = |axis: usize| {
        (
            (lo[axis] - half_width).ceil() as i32,
            (hi[axis] + half_width).floor() as i32,
        )
    };

    let k = normal.iamax();
    let a = (k + 1) % 3;
    let b = (k + 2) % 3;
    let (a0, a1) = range(a);
    let (b0, b1) = range(b);
    let (k0, k1) = range(k);
    let spread = half_width / normal[k].abs();

    for ia in a0..=a1 {
        for ib in b0..=b1 {
            let center =
                (plane - normal[a] * f64::from(ia) - normal[b] * f64::from(ib)) / normal[k];
            let lo_k = ((center - spread).ceil() as i32).max(k0);
            let hi_k = ((center + spread).floor() as i32).min(k1);
            for ik in lo_k..=hi_k {
                let mut index = [0; 3];
                index[a] = ia;
                index[b] = ib;
                index[k] = ik;
                let coord = Coord::new(index[0], index[1], index[2]);
                let d_sq = tri.distance_squared(&coord.to_point());
                if d_sq < hw_sq {
                    let d = d_sq.sqrt();
                    acc.entry(coord)
                        .and_modify(|e| *e = e.min(d))
                        .or_insert(d);
                }
            }
        }
    }
}

/// Inside/outside classification by majority vote over three axis rays.
///
/// Along each ray a voxel is inside when its winding number is nonzero,
/// so overlapping closed shells classify as their union and a mesh with
/// reversed winding still reads as solid.
fn classify_inside(triangles: &[Triangle], coords: &[Coord]) -> Vec<bool> {
    let mut votes = vec![0u8; coords.len()];
    for axis in 0..3 {
        for (index, inside) in axis_winding(triangles, coords, axis) {
            if inside {
                votes[index] += 1;
            }
        }
    }
    votes.into_iter().map(|v| v >= 2).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn ray_bin(value: f64) -> i32 {
    (value / RAY_BIN_SIZE).floor() as i32
}

/// Nonzero winding along `axis` for each coordinate, computed one
/// scanline at a time.
fn axis_winding(triangles: &[Triangle], coords: &[Coord], axis: usize) -> Vec<(usize, bool)> {
    let b = (axis + 1) % 3;
    let c = (axis + 2) % 3;

    let mut bins: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
    for (ti, tri) in triangles.iter().enumerate() {
        let lo = tri.min_corner();
        let hi = tri.max_corner();
        for bb in ray_bin(lo[b])..=ray_bin(hi[b]) {
            for bc in ray_bin(lo[c])..=ray_bin(hi[c]) {
                bins.entry((bb, bc)).or_default().push(ti);
            }
        }
    }

    let mut scanlines: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
    for (index, coord) in coords.iter().enumerate() {
        scanlines
            .entry((coord.axis(b), coord.axis(c)))
            .or_default()
            .push(index);
    }

    scanlines
        .par_iter()
        .flat_map_iter(|(&(rb, rc), members)| {
            let ray_b = f64::from(rb) + RAY_JITTER.0;
            let ray_c = f64::from(rc) + RAY_JITTER.1;

            let mut hits: SmallVec<[RayHit; 8]> = SmallVec::new();
            if let Some(candidates) = bins.get(&(ray_bin(ray_b), ray_bin(ray_c))) {
                hits.extend(
                    candidates
                        .iter()
                        .filter_map(|&ti| ray_hit(&triangles[ti], axis, ray_b, ray_c)),
                );
            }
            hits.sort_unstable_by(|x, y| x.t.total_cmp(&y.t).then(x.crossing.cmp(&y.crossing)));
            // A ray through a shared edge meets both faces; count it once
            hits.dedup_by(|x, y| {
                x.crossing == y.crossing && (x.t - y.t).abs() < HIT_MERGE_EPSILON
            });

            let mut winding: SmallVec<[i32; 9]> = SmallVec::with_capacity(hits.len() + 1);
            winding.push(0);
            for hit in &hits {
                let last = winding[winding.len() - 1];
                winding.push(last + i32::from(hit.crossing));
            }

            members.iter().map(move |&index| {
                let t = f64::from(coords[index].axis(axis));
                let before = hits.partition_point(|h| h.t < t);
                (index, winding[before] != 0)
            })
        })
        .collect()
}

/// A ray crossing: position along the ray and the signed winding
/// contribution, `+1` entering a face and `-1` leaving it.
#[derive(Debug, Clone, Copy)]
struct RayHit {
    t: f64,
    crossing: i8,
}

/// Where a ray parallel to `axis` through `(ray_b, ray_c)` crosses the
/// triangle, using barycentric coordinates in the projected plane.
fn ray_hit(tri: &Triangle, axis: usize, ray_b: f64, ray_c: f64) -> Option<RayHit> {
    let b = (axis + 1) % 3;
    let c = (axis + 2) % 3;
    let (p0, p1, p2) = (tri.v0, tri.v1, tri.v2);

    // The normal's component along the ray
    let det = (p1[b] - p0[b]) * (p2[c] - p0[c]) - (p1[c] - p0[c]) * (p2[b] - p0[b]);
    if det.abs() < 1e-15 {
        return None;
    }
    let inv = 1.0 / det;

    let u = ((ray_b - p0[b]) * (p2[c] - p0[c]) - (ray_c - p0[c]) * (p2[b] - p0[b])) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let v = ((p1[b] - p0[b]) * (ray_c - p0[c]) - (p1[c] - p0[c]) * (ray_b - p0[b])) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    Some(RayHit {
        t: p0[axis] * (1.0 - u - v) + p1[axis] * u + p2[axis] * v,
        crossing: if det < 0.0 { 1 } else { -1 },
    })
}
