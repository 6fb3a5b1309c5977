//! Sparse narrow-band storage for signed distance values.
//!
//! Values live in 8×8×8 leaf blocks allocated on demand, so memory scales
//! with the number of voxels near the surface rather than with the volume
//! of the bounding box. Voxels inside an allocated leaf carry an *active*
//! bit; inactive voxels and unallocated leaves resolve to the background
//! value `±half_width`, with the sign recorded by [`NarrowBandGrid::signed_flood_fill`].
//!
//! All stored distances are in **voxel units**. World coordinates relate
//! to voxel coordinates by the linear map `world = voxel * voxel_size`.

use std::ops::{Add, Sub};

use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use rayon::prelude::*;

use crate::error::{LevelSetError, LevelSetResult};

/// Log2 of the leaf edge length.
pub const LEAF_LOG2: i32 = 3;

/// Leaf edge length in voxels.
pub const LEAF_DIM: i32 = 1 << LEAF_LOG2;

const LEAF_MASK: i32 = LEAF_DIM - 1;
const LEAF_VOXELS: usize = 1 << (3 * LEAF_LOG2);
const MASK_WORDS: usize = LEAF_VOXELS / 64;

/// Integer voxel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Coord {
    /// X index.
    pub x: i32,
    /// Y index.
    pub y: i32,
    /// Z index.
    pub z: i32,
}

impl Coord {
    /// Create a coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Unit step along `axis` (0 = x, 1 = y, 2 = z).
    #[inline]
    #[must_use]
    pub const fn unit(axis: usize) -> Self {
        match axis {
            0 => Self::new(1, 0, 0),
            1 => Self::new(0, 1, 0),
            _ => Self::new(0, 0, 1),
        }
    }

    /// Component along `axis`.
    #[inline]
    #[must_use]
    pub const fn axis(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// This coordinate moved `delta` voxels along `axis`.
    #[inline]
    #[must_use]
    pub const fn shifted(self, axis: usize, delta: i32) -> Self {
        match axis {
            0 => Self::new(self.x + delta, self.y, self.z),
            1 => Self::new(self.x, self.y + delta, self.z),
            _ => Self::new(self.x, self.y, self.z + delta),
        }
    }

    /// The six face neighbors, ordered `-x, +x, -y, +y, -z, +z`.
    #[inline]
    #[must_use]
    pub const fn neighbors(self) -> [Self; 6] {
        let Self { x, y, z } = self;
        [
            Self::new(x - 1, y, z),
            Self::new(x + 1, y, z),
            Self::new(x, y - 1, z),
            Self::new(x, y + 1, z),
            Self::new(x, y, z - 1),
            Self::new(x, y, z + 1),
        ]
    }

    /// Voxel position as a point in index space.
    #[inline]
    #[must_use]
    pub fn to_point(self) -> Point3<f64> {
        Point3::new(f64::from(self.x), f64::from(self.y), f64::from(self.z))
    }

    /// Coordinate of the leaf block containing this voxel.
    #[inline]
    #[must_use]
    pub const fn leaf_key(self) -> Self {
        Self::new(
            self.x >> LEAF_LOG2,
            self.y >> LEAF_LOG2,
            self.z >> LEAF_LOG2,
        )
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    const fn local_index(self) -> usize {
        (((self.x & LEAF_MASK) << (2 * LEAF_LOG2))
            | ((self.y & LEAF_MASK) << LEAF_LOG2)
            | (self.z & LEAF_MASK)) as usize
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    const fn from_leaf(key: Self, index: usize) -> Self {
        let i = index as i32;
        Self::new(
            (key.x << LEAF_LOG2) | ((i >> (2 * LEAF_LOG2)) & LEAF_MASK),
            (key.y << LEAF_LOG2) | ((i >> LEAF_LOG2) & LEAF_MASK),
            (key.z << LEAF_LOG2) | (i & LEAF_MASK),
        )
    }
}

impl Add for Coord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Coord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Dense 8³ block of values with an activity mask.
#[derive(Debug, Clone, PartialEq)]
struct Leaf {
    values: [f32; LEAF_VOXELS],
    active: [u64; MASK_WORDS],
}

impl Leaf {
    fn filled(value: f32) -> Self {
        Self {
            values: [value; LEAF_VOXELS],
            active: [0; MASK_WORDS],
        }
    }

    #[inline]
    fn is_active(&self, index: usize) -> bool {
        (self.active[index >> 6] >> (index & 63)) & 1 == 1
    }

    #[inline]
    fn set_active(&mut self, index: usize) {
        self.active[index >> 6] |= 1 << (index & 63);
    }

    fn active_count(&self) -> usize {
        self.active.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    /// Propagate signs into inactive voxels by sweeping x, then y, then z,
    /// carrying the sign of the most recent active voxel.
    fn flood_fill(&mut self, background: f32) {
        let Some(first) = self.active_indices().next() else {
            return;
        };
        let dim = LEAF_DIM as usize;
        let mut x_inside = self.values[first] < 0.0;
        for x in 0..dim {
            let x00 = x << (2 * LEAF_LOG2);
            if self.is_active(x00) {
                x_inside = self.values[x00] < 0.0;
            }
            let mut y_inside = x_inside;
            for y in 0..dim {
                let xy0 = x00 + (y << LEAF_LOG2);
                if self.is_active(xy0) {
                    y_inside = self.values[xy0] < 0.0;
                }
                let mut z_inside = y_inside;
                for z in 0..dim {
                    let xyz = xy0 + z;
                    if self.is_active(xyz) {
                        z_inside = self.values[xyz] < 0.0;
                    } else {
                        self.values[xyz] = if z_inside { -background } else { background };
                    }
                }
            }
        }
    }
}

/// A sparse narrow-band signed distance grid.
///
/// Negative values are inside, positive values outside. Active values
/// satisfy `|value| <= half_width`; everything else reads as
/// `±half_width`.
///
/// # Example
///
/// ```
/// use mesh_levelset::{Coord, NarrowBandGrid};
///
/// let mut grid = NarrowBandGrid::new(0.1, 3.0).unwrap();
/// grid.set_value(Coord::new(1, 2, 3), -0.5);
///
/// assert_eq!(grid.value(Coord::new(1, 2, 3)), -0.5);
/// assert_eq!(grid.value(Coord::new(100, 0, 0)), 3.0);
/// assert_eq!(grid.active_voxel_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NarrowBandGrid {
    voxel_size: f64,
    half_width: f32,
    leaves: HashMap<Coord, Box<Leaf>>,
    /// Unallocated leaves that lie entirely inside the surface.
    interior: HashSet<Coord>,
}

impl NarrowBandGrid {
    /// Create an empty grid.
    ///
    /// # Errors
    ///
    /// Returns an error if `voxel_size` is not positive and finite, or if
    /// `half_width` is below one voxel.
    pub fn new(voxel_size: f64, half_width: f32) -> LevelSetResult<Self> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(LevelSetError::InvalidVoxelSize(voxel_size));
        }
        if !(half_width.is_finite() && half_width >= 1.0) {
            return Err(LevelSetError::InvalidHalfWidth(half_width));
        }
        Ok(Self {
            voxel_size,
            half_width,
            leaves: HashMap::new(),
            interior: HashSet::new(),
        })
    }

    /// World units per voxel edge.
    #[inline]
    #[must_use]
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Band extent on each side of the surface, in voxels.
    #[inline]
    #[must_use]
    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    /// Value at a voxel, falling back to the signed background.
    #[must_use]
    pub fn value(&self, coord: Coord) -> f32 {
        let key = coord.leaf_key();
        match self.leaves.get(&key) {
            Some(leaf) => leaf.values[coord.local_index()],
            None if self.interior.contains(&key) => -self.half_width,
            None => self.half_width,
        }
    }

    /// Whether a voxel holds an explicitly stored value.
    #[must_use]
    pub fn is_active(&self, coord: Coord) -> bool {
        self.leaves
            .get(&coord.leaf_key())
            .is_some_and(|leaf| leaf.is_active(coord.local_index()))
    }

    /// Store a value and mark the voxel active.
    pub fn set_value(&mut self, coord: Coord, value: f32) {
        let key = coord.leaf_key();
        let fill = if self.interior.remove(&key) {
            -self.half_width
        } else {
            self.half_width
        };
        let leaf = self
            .leaves
            .entry(key)
            .or_insert_with(|| Box::new(Leaf::filled(fill)));
        let index = coord.local_index();
        leaf.values[index] = value;
        leaf.set_active(index);
    }

    /// Number of active voxels.
    #[must_use]
    pub fn active_voxel_count(&self) -> usize {
        self.leaves.values().map(|leaf| leaf.active_count()).sum()
    }

    /// Number of allocated leaf blocks.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of unallocated leaf blocks classified as inside.
    #[must_use]
    pub fn interior_leaf_count(&self) -> usize {
        self.interior.len()
    }

    /// A grid with no active voxels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.values().all(|leaf| leaf.active_count() == 0)
    }

    /// Iterate over active voxels in unspecified order.
    pub fn iter_active(&self) -> impl Iterator<Item = (Coord, f32)> + '_ {
        self.leaves.iter().flat_map(|(&key, leaf)| {
            leaf.active_indices()
                .map(move |i| (Coord::from_leaf(key, i), leaf.values[i]))
        })
    }

    /// Active voxel coordinates in ascending order.
    #[must_use]
    pub fn active_coords_sorted(&self) -> Vec<Coord> {
        let mut coords: Vec<Coord> = self.iter_active().map(|(c, _)| c).collect();
        coords.par_sort_unstable();
        coords
    }

    /// Apply `f` to every active value.
    pub fn for_each_active_mut(&mut self, mut f: impl FnMut(Coord, &mut f32)) {
        for (&key, leaf) in &mut self.leaves {
            let indices: Vec<usize> = leaf.active_indices().collect();
            for i in indices {
                f(Coord::from_leaf(key, i), &mut leaf.values[i]);
            }
        }
    }

    /// Recompute every active value from a read-only view of the grid.
    ///
    /// `f` sees the grid as it was before the update, so stencil operators
    /// can be evaluated per leaf in parallel.
    pub(crate) fn update_active_par<F>(&mut self, f: F)
    where
        F: Fn(&Self, Coord, f32) -> f32 + Sync,
    {
        let updates: Vec<(Coord, Vec<(usize, f32)>)> = self
            .leaves
            .par_iter()
            .map(|(&key, leaf)| {
                let values = leaf
                    .active_indices()
                    .map(|i| (i, f(self, Coord::from_leaf(key, i), leaf.values[i])))
                    .collect();
                (key, values)
            })
            .collect();

        for (key, values) in updates {
            if let Some(leaf) = self.leaves.get_mut(&key) {
                for (i, value) in values {
                    leaf.values[i] = value;
                }
            }
        }
    }

    /// Clamp active values to `[-half_width, half_width]`.
    pub fn clamp_to_band(&mut self) {
        let hw = self.half_width;
        self.for_each_active_mut(|_, v| *v = v.clamp(-hw, hw));
    }

    /// Resolve the sign of every inactive voxel and unallocated leaf.
    ///
    /// Inside each leaf, inactive voxels copy the sign of the nearest
    /// preceding active voxel in x-major scan order. Between leaves,
    /// unallocated blocks along each x row take the sign of the +x face of
    /// the allocated leaf before them; rows start and end outside.
    pub fn signed_flood_fill(&mut self) {
        self.leaves.retain(|_, leaf| leaf.active_count() > 0);

        let background = self.half_width;
        self.leaves
            .par_iter_mut()
            .for_each(|(_, leaf)| leaf.flood_fill(background));

        let mut rows: HashMap<(i32, i32), Vec<i32>> = HashMap::new();
        for key in self.leaves.keys() {
            rows.entry((key.y, key.z)).or_default().push(key.x);
        }

        let face_index = Coord::new(LEAF_MASK, 0, 0).local_index();
        self.interior.clear();
        for ((y, z), mut xs) in rows {
            xs.sort_unstable();
            for pair in xs.windows(2) {
                let (start, end) = (pair[0], pair[1]);
                if end <= start + 1 {
                    continue;
                }
                let inside = self
                    .leaves
                    .get(&Coord::new(start, y, z))
                    .is_some_and(|leaf| leaf.values[face_index] < 0.0);
                if inside {
                    self.interior
                        .extend((start + 1..end).map(|x| Coord::new(x, y, z)));
                }
            }
        }
    }

    /// Inclusive bounds of the active voxels, or `None` for an empty grid.
    #[must_use]
    pub fn active_bounds(&self) -> Option<(Coord, Coord)> {
        self.iter_active().fold(None, |acc, (c, _)| match acc {
            None => Some((c, c)),
            Some((lo, hi)) => Some((
                Coord::new(lo.x.min(c.x), lo.y.min(c.y), lo.z.min(c.z)),
                Coord::new(hi.x.max(c.x), hi.y.max(c.y), hi.z.max(c.z)),
            )),
        })
    }

    /// Convert a world-space point to (fractional) voxel coordinates.
    #[inline]
    #[must_use]
    pub fn world_to_index(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(point.coords / self.voxel_size)
    }

    /// Convert (fractional) voxel coordinates to a world-space point.
    #[inline]
    #[must_use]
    pub fn index_to_world(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(point.coords * self.voxel_size)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Analytic sphere band centered at `center` (voxel units).
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn sphere_grid(center: [f64; 3], radius: f64, half_width: f32) -> NarrowBandGrid {
        let mut grid = NarrowBandGrid::new(1.0, half_width).unwrap();
        let reach = (radius + f64::from(half_width)).ceil() as i32 + 1;
        let c = Point3::new(center[0], center[1], center[2]);
        let base = Coord::new(c.x as i32, c.y as i32, c.z as i32);
        for x in -reach..=reach {
            for y in -reach..=reach {
                for z in -reach..=reach {
                    let coord = base + Coord::new(x, y, z);
                    let d = (coord.to_point() - c).norm() - radius;
                    if d.abs() < f64::from(half_width) {
                        grid.set_value(coord, d as f32);
                    }
                }
            }
        }
        grid.signed_flood_fill();
        grid
    }

    #[test]
    fn leaf_key_handles_negative_coords() {
        assert_eq!(Coord::new(-1, 0, 7).leaf_key(), Coord::new(-1, 0, 0));
        assert_eq!(Coord::new(-8, -9, 8).leaf_key(), Coord::new(-1, -2, 1));
    }

    #[test]
    fn local_index_round_trip() {
        for coord in [
            Coord::new(0, 0, 0),
            Coord::new(-3, 17, -40),
            Coord::new(7, 7, 7),
            Coord::new(-8, -1, 1000),
        ] {
            let back = Coord::from_leaf(coord.leaf_key(), coord.local_index());
            assert_eq!(back, coord);
        }
    }

    #[test]
    fn rejects_bad_construction() {
        assert!(NarrowBandGrid::new(0.0, 3.0).is_err());
        assert!(NarrowBandGrid::new(f64::NAN, 3.0).is_err());
        assert!(NarrowBandGrid::new(0.1, 0.5).is_err());
        assert!(NarrowBandGrid::new(0.1, f32::INFINITY).is_err());
    }

    #[test]
    fn get_set_and_background() {
        let mut grid = NarrowBandGrid::new(0.5, 4.0).unwrap();
        grid.set_value(Coord::new(3, -2, 9), 1.25);

        assert!(grid.is_active(Coord::new(3, -2, 9)));
        assert!(!grid.is_active(Coord::new(3, -2, 10)));
        assert_relative_eq!(grid.value(Coord::new(3, -2, 9)), 1.25);
        assert_relative_eq!(grid.value(Coord::new(3, -2, 10)), 4.0);
        assert_relative_eq!(grid.value(Coord::new(-500, 0, 0)), 4.0);
    }

    #[test]
    fn flood_fill_classifies_sphere_interior() {
        let grid = sphere_grid([0.5, 0.5, 0.5], 20.0, 3.0);

        // Deep inside: unallocated leaf marked interior
        assert_relative_eq!(grid.value(Coord::new(0, 0, 0)), -3.0);
        assert!(grid.interior_leaf_count() > 0);
        // Far outside
        assert_relative_eq!(grid.value(Coord::new(40, 0, 0)), 3.0);
        // Inside the band but away from the surface
        assert!(grid.value(Coord::new(17, 0, 0)) < 0.0);
        assert!(grid.value(Coord::new(23, 0, 0)) > 0.0);
    }

    #[test]
    fn set_value_inside_interior_leaf_keeps_sign() {
        let mut grid = sphere_grid([0.5, 0.5, 0.5], 20.0, 3.0);
        let center = Coord::new(0, 0, 0);
        grid.set_value(center, -2.0);
        // Neighbor in the freshly allocated leaf still reads as inside
        assert_relative_eq!(grid.value(Coord::new(1, 0, 0)), -3.0);
    }

    #[test]
    fn active_bounds_and_iteration() {
        let mut grid = NarrowBandGrid::new(1.0, 2.0).unwrap();
        assert!(grid.active_bounds().is_none());
        assert!(grid.is_empty());

        grid.set_value(Coord::new(-4, 2, 0), 0.5);
        grid.set_value(Coord::new(9, -1, 3), -0.5);
        let (lo, hi) = grid.active_bounds().unwrap();
        assert_eq!(lo, Coord::new(-4, -1, 0));
        assert_eq!(hi, Coord::new(9, 2, 3));
        assert_eq!(grid.iter_active().count(), 2);
        assert_eq!(
            grid.active_coords_sorted(),
            vec![Coord::new(-4, 2, 0), Coord::new(9, -1, 3)]
        );
    }

    #[test]
    fn clamp_to_band_limits_values() {
        let mut grid = NarrowBandGrid::new(1.0, 2.0).unwrap();
        grid.set_value(Coord::new(0, 0, 0), 7.0);
        grid.set_value(Coord::new(1, 0, 0), -7.0);
        grid.clamp_to_band();
        assert_relative_eq!(grid.value(Coord::new(0, 0, 0)), 2.0);
        assert_relative_eq!(grid.value(Coord::new(1, 0, 0)), -2.0);
    }

    #[test]
    fn world_index_transform() {
        let grid = NarrowBandGrid::new(0.25, 2.0).unwrap();
        let p = grid.world_to_index(&Point3::new(1.0, -0.5, 0.25));
        assert_relative_eq!(p.x, 4.0);
        assert_relative_eq!(p.y, -2.0);
        let w = grid.index_to_world(&p);
        assert_relative_eq!(w.z, 0.25);
    }
}
