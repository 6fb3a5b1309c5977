//! Isosurface extraction with naive surface nets.
//!
//! Every grid cell (the cube spanned by eight neighboring voxels) that
//! straddles the isovalue receives one vertex at the mean of its edge
//! crossings. Every voxel edge that crosses the isovalue emits one quad
//! joining the vertices of the four cells around it.

use hashbrown::HashMap;
use mesh_types::{IndexedMesh, Point3, Vector3, Vertex};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{LevelSetError, LevelSetResult};
use crate::grid::{Coord, NarrowBandGrid};

/// Configuration for [`extract_surface`].
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Level to extract.
    pub isovalue: f32,
    /// Upper bound on output vertices.
    pub max_vertices: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            isovalue: 0.0,
            max_vertices: 100_000_000,
        }
    }
}

impl ExtractConfig {
    /// Set the isovalue.
    #[must_use]
    pub const fn with_isovalue(mut self, isovalue: f32) -> Self {
        self.isovalue = isovalue;
        self
    }

    /// Set the output vertex budget.
    #[must_use]
    pub const fn with_max_vertices(mut self, limit: usize) -> Self {
        self.max_vertices = limit;
        self
    }
}

/// Quad-dominant surface in world coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsoSurface {
    /// Vertex positions.
    pub points: Vec<Point3<f64>>,
    /// Quads, counter-clockwise when viewed from outside.
    pub quads: Vec<[u32; 4]>,
}

impl IsoSurface {
    /// No geometry was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Number of triangles after splitting every quad.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.quads.len() * 2
    }

    /// Triangulate: quad `(a, b, c, d)` becomes `(a, b, c)` and `(a, c, d)`.
    #[must_use]
    pub fn into_mesh(self) -> IndexedMesh {
        let vertices = self.points.into_iter().map(Vertex::new).collect();
        let faces = self
            .quads
            .iter()
            .flat_map(|&[a, b, c, d]| [[a, b, c], [a, c, d]])
            .collect();
        IndexedMesh::from_parts(vertices, faces)
    }
}

/// A voxel edge from `lo` to `lo + unit(axis)` that crosses the isovalue.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    lo: Coord,
    axis: usize,
    /// Fraction along the edge where the isovalue is met.
    t: f64,
    /// The `lo` end is below the isovalue.
    lo_inside: bool,
}

impl Crossing {
    /// Min corners of the four cells sharing this edge, counter-clockwise
    /// around `+axis`.
    fn cells(&self) -> [Coord; 4] {
        let b = (self.axis + 1) % 3;
        let c = (self.axis + 2) % 3;
        let lo = self.lo;
        [
            lo.shifted(b, -1).shifted(c, -1),
            lo.shifted(c, -1),
            lo,
            lo.shifted(b, -1),
        ]
    }

    fn point(&self) -> Vector3<f64> {
        let mut p = self.lo.to_point().coords;
        p[self.axis] += self.t;
        p
    }
}

/// Extract the isosurface of `grid` at `config.isovalue`.
///
/// An empty grid, or one that never crosses the isovalue, yields an empty
/// surface. Output order is deterministic for a given grid.
///
/// # Errors
///
/// Returns [`LevelSetError::OutputTooLarge`] if the surface needs more than
/// `config.max_vertices` vertices.
pub fn extract_surface(grid: &NarrowBandGrid, config: &ExtractConfig) -> LevelSetResult<IsoSurface> {
    let iso = config.isovalue;
    let coords = grid.active_coords_sorted();

    let crossings: Vec<Crossing> = coords
        .par_iter()
        .flat_map_iter(|&p| {
            (0..3).flat_map(move |axis| {
                let below = p.shifted(axis, -1);
                let lower = (!grid.is_active(below)).then_some(below);
                lower
                    .into_iter()
                    .chain(std::iter::once(p))
                    .filter_map(move |lo| edge_crossing(grid, lo, axis, iso))
            })
        })
        .collect();

    if crossings.is_empty() {
        debug!("No isovalue crossings, surface is empty");
        return Ok(IsoSurface::default());
    }

    let mut accum: HashMap<Coord, (Vector3<f64>, u32)> = HashMap::new();
    for crossing in &crossings {
        let p = crossing.point();
        for cell in crossing.cells() {
            let entry = accum.entry(cell).or_insert((Vector3::zeros(), 0));
            entry.0 += p;
            entry.1 += 1;
        }
    }

    if accum.len() > config.max_vertices {
        return Err(LevelSetError::OutputTooLarge {
            vertices: accum.len(),
            limit: config.max_vertices,
        });
    }

    let mut cells: Vec<(Coord, Vector3<f64>, u32)> =
        accum.into_iter().map(|(c, (sum, n))| (c, sum, n)).collect();
    cells.par_sort_unstable_by_key(|&(c, _, _)| c);

    let voxel_size = grid.voxel_size();
    let mut index: HashMap<Coord, u32> = HashMap::with_capacity(cells.len());
    let mut points = Vec::with_capacity(cells.len());
    for (i, (cell, sum, n)) in cells.into_iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let id = i as u32;
        index.insert(cell, id);
        points.push(Point3::from(sum / f64::from(n) * voxel_size));
    }

    let quads: Vec<[u32; 4]> = crossings
        .iter()
        .filter_map(|crossing| {
            let [a, b, c, d] = crossing.cells().map(|cell| index.get(&cell).copied());
            let quad = [a?, b?, c?, d?];
            Some(if crossing.lo_inside {
                quad
            } else {
                [quad[3], quad[2], quad[1], quad[0]]
            })
        })
        .collect();

    debug!(
        "Extracted surface: {} vertices, {} quads",
        points.len(),
        quads.len()
    );
    Ok(IsoSurface { points, quads })
}

fn edge_crossing(grid: &NarrowBandGrid, lo: Coord, axis: usize, iso: f32) -> Option<Crossing> {
    let v_lo = grid.value(lo);
    let v_hi = grid.value(lo.shifted(axis, 1));
    let lo_inside = v_lo < iso;
    if lo_inside == (v_hi < iso) {
        return None;
    }
    let t = f64::from(iso - v_lo) / f64::from(v_hi - v_lo);
    Some(Crossing {
        lo,
        axis,
        t: t.clamp(0.0, 1.0),
        lo_inside,
    })
}
