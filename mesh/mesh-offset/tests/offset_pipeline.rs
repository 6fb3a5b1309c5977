//! End-to-end tests for the offset pipeline and its flat-buffer surface.

use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use mesh_levelset::{LevelSetResult, RasterizeConfig, mesh_to_level_set};
use mesh_offset::{
    BandPolicy, ExtractConfig, FastMarchingRebuild, LevelSetError, MeshBuffers, NarrowBandGrid, OffsetError, OffsetParams, OffsetPipeline,
    OutputBuffers, RebuildPolicy, Reinitialize, Stage, create, create_with, offset_mesh,
};
use mesh_types::{IndexedMesh, Point3, Vector3, unit_cube};

// =============================================================================
// Helpers
// =============================================================================

fn cube_buffers() -> (Vec<f32>, Vec<i32>) {
    let cube = unit_cube();
    let indices = cube
        .faces
        .iter()
        .flatten()
        .map(|&i| i32::try_from(i).unwrap())
        .collect();
    (cube.positions_f32(), indices)
}

/// Distance from `p` to the surface of the unit cube, negative inside.
fn cube_distance(p: &Point3<f64>) -> f64 {
    let q: [f64; 3] = [
        (p.x - 0.5).abs() - 0.5,
        (p.y - 0.5).abs() - 0.5,
        (p.z - 0.5).abs() - 0.5,
    ];
    let outside = q.iter().map(|v| v.max(0.0).powi(2)).sum::<f64>().sqrt();
    let inside = q[0].max(q[1]).max(q[2]).min(0.0);
    outside + inside
}

fn max_distance_error(mesh: &IndexedMesh, expected: f64) -> f64 {
    mesh.vertices
        .iter()
        .map(|v| (cube_distance(&v.position) - expected).abs())
        .fold(0.0, f64::max)
}

/// Delegates to fast marching and counts calls.
#[derive(Debug, Default)]
struct CountingRebuild {
    calls: AtomicUsize,
    inner: FastMarchingRebuild,
}

impl CountingRebuild {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Reinitialize for CountingRebuild {
    fn rebuild(
        &self,
        grid: &NarrowBandGrid,
        isovalue: f32,
        half_width: f32,
    ) -> LevelSetResult<NarrowBandGrid> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.rebuild(grid, isovalue, half_width)
    }
}

fn rebuild_calls(params: OffsetParams) -> usize {
    rebuild_calls_with(params, RebuildPolicy::default())
}

fn rebuild_calls_with(params: OffsetParams, policy: RebuildPolicy) -> usize {
    let pipeline = OffsetPipeline::new(params)
        .with_rebuild_policy(policy)
        .with_reinitializer(CountingRebuild::default());
    pipeline.run(&unit_cube()).unwrap();
    pipeline.reinitializer().calls()
}

/// Two unit cubes in one soup, the second shifted so they overlap.
fn overlapping_cubes(shift: Vector3<f64>) -> IndexedMesh {
    let mut mesh = unit_cube();
    let mut second = unit_cube();
    second.translate(shift);
    let base = u32::try_from(mesh.vertices.len()).unwrap();
    mesh.vertices.extend(second.vertices);
    mesh.faces
        .extend(second.faces.iter().map(|f| [f[0] + base, f[1] + base, f[2] + base]));
    mesh
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn cube_grows_by_offset() {
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let grown = offset_mesh(&unit_cube(), &params).unwrap();

    assert!(grown.face_count() > 0);
    // Rounded box: 1 + 6·0.2 + 3π·0.04 + 4/3·π·0.008 ≈ 2.61
    let volume = grown.signed_volume();
    assert!(volume > 2.3 && volume < 2.9, "volume {volume}");
    assert!(max_distance_error(&grown, 0.2) < 0.15);
}

#[test]
fn cube_shrinks_by_negative_offset() {
    let params = OffsetParams::new(-0.2).with_voxel_size(0.05);
    let shrunk = offset_mesh(&unit_cube(), &params).unwrap();

    assert!(shrunk.face_count() > 0);
    // Inner cube of side 0.6
    let volume = shrunk.signed_volume();
    assert!(volume > 0.15 && volume < 0.3, "volume {volume}");
    assert!(max_distance_error(&shrunk, -0.2) < 0.075);
}

#[test]
fn offset_sign_orders_volumes() {
    let cube = unit_cube();
    let base = OffsetParams::new(0.0).with_voxel_size(0.1);
    let same = offset_mesh(&cube, &base).unwrap().signed_volume();
    let grown = offset_mesh(&cube, &base.with_offset(0.1))
        .unwrap()
        .signed_volume();
    let shrunk = offset_mesh(&cube, &base.with_offset(-0.1))
        .unwrap()
        .signed_volume();

    assert!(shrunk < same);
    assert!(same < grown);
    assert!(shrunk > 0.0, "output must stay outward oriented");
}

#[test]
fn zero_offset_is_near_identity() {
    let params = OffsetParams::new(0.0).with_voxel_size(0.05);
    let output = OffsetPipeline::new(params).run(&unit_cube()).unwrap();

    assert!(!output.report.ran(Stage::Offset));
    assert_relative_eq!(output.mesh.signed_volume(), 1.0, epsilon = 0.1);
    assert!(max_distance_error(&output.mesh, 0.0) < 0.075);
}

#[test]
fn off_grid_placement_gives_same_volume() {
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let mut shifted = unit_cube();
    shifted.translate(Vector3::new(0.537, -1.219, 2.071));

    let aligned = offset_mesh(&unit_cube(), &params).unwrap().signed_volume();
    let moved = offset_mesh(&shifted, &params).unwrap().signed_volume();
    assert_relative_eq!(moved, aligned, max_relative = 0.05);
}

#[test]
fn overlapping_shells_offset_as_union() {
    let shift = Vector3::new(0.5, 0.13, 0.07);
    let soup = overlapping_cubes(shift);
    // Two unit cubes minus their 0.5 · 0.87 · 0.93 overlap
    let union = 2.0 - 0.5 * 0.87 * 0.93;

    let params = OffsetParams::new(0.0).with_voxel_size(0.05);
    let merged = offset_mesh(&soup, &params).unwrap();
    assert_relative_eq!(merged.signed_volume(), union, max_relative = 0.05);

    // No surface is left inside the overlap
    let center = Point3::new(0.75, 0.6, 0.55);
    let nearest = merged
        .vertices
        .iter()
        .map(|v| (v.position - center).norm())
        .fold(f64::INFINITY, f64::min);
    assert!(nearest > 0.3, "inner surface at distance {nearest}");
}

#[test]
fn reversed_shell_stays_solid() {
    let mut flipped = unit_cube();
    flipped.flip_normals();
    let params = OffsetParams::new(0.1).with_voxel_size(0.05);

    let reference = offset_mesh(&unit_cube(), &params).unwrap().signed_volume();
    let volume = offset_mesh(&flipped, &params).unwrap().signed_volume();
    assert_relative_eq!(volume, reference, max_relative = 1e-3);
}

#[test]
fn voxel_size_defaults_from_offset() {
    let params = OffsetParams::new(0.3);
    let output = OffsetPipeline::new(params).run(&unit_cube()).unwrap();
    assert_relative_eq!(output.report.voxel_size, 0.1, epsilon = 1e-12);
    assert!(output.mesh.signed_volume() > 1.0);
}

#[test]
fn smoothing_keeps_cube_closed_and_oriented() {
    let params = OffsetParams::new(0.1)
        .with_voxel_size(0.05)
        .with_smoothing_before(2, 1.0)
        .with_smoothing_after(2, 1.0);
    let smoothed = offset_mesh(&unit_cube(), &params).unwrap();
    assert!(smoothed.face_count() > 0);
    assert!(smoothed.signed_volume() > 1.0);
}

#[test]
fn no_smoothing_prepare_matches_rasterization() {
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let pipeline = OffsetPipeline::new(params);
    let (prepared, report) = pipeline.prepare(&unit_cube()).unwrap();

    let config = RasterizeConfig::default().with_half_width(pipeline.half_width());
    let (direct, _) = mesh_to_level_set(&unit_cube(), 0.1, &config).unwrap();

    assert_eq!(report.stages, vec![Stage::Rasterize]);
    assert_eq!(prepared, direct);
}

#[test]
fn output_is_deterministic() {
    let params = OffsetParams::new(0.15).with_voxel_size(0.1);
    let a = offset_mesh(&unit_cube(), &params).unwrap();
    let b = offset_mesh(&unit_cube(), &params).unwrap();
    assert_eq!(a, b);
}

// =============================================================================
// Rebuild policy
// =============================================================================

#[test]
fn rebuild_before_follows_threshold() {
    // 3·2² = 12 stays under the threshold, 4·2² = 16 crosses it
    let light = OffsetParams::new(0.1)
        .with_voxel_size(0.1)
        .with_smoothing_before(3, 2.0);
    assert_eq!(rebuild_calls(light), 1);

    let heavy = light.with_smoothing_before(4, 2.0);
    assert_eq!(rebuild_calls(heavy), 2);
}

#[test]
fn rebuild_after_follows_threshold() {
    let light = OffsetParams::new(0.1)
        .with_voxel_size(0.1)
        .with_smoothing_after(3, 2.0);
    assert_eq!(rebuild_calls(light), 1);

    let heavy = light.with_smoothing_after(4, 2.0);
    assert_eq!(rebuild_calls(heavy), 2);
}

#[test]
fn rebuild_threshold_is_tunable() {
    // 1·2² = 4 stays under the default threshold but crosses a threshold of 3
    let params = OffsetParams::new(0.1)
        .with_voxel_size(0.1)
        .with_smoothing_before(1, 2.0);
    assert_eq!(rebuild_calls(params), 1);
    assert_eq!(rebuild_calls_with(params, RebuildPolicy { threshold: 3.0 }), 2);

    let both = params.with_smoothing_after(1, 2.0);
    assert_eq!(rebuild_calls_with(both, RebuildPolicy { threshold: 3.0 }), 3);
    assert_eq!(rebuild_calls_with(both, RebuildPolicy { threshold: 4.0 }), 1);
}

#[test]
fn band_policy_sets_half_width() {
    let params = OffsetParams::new(0.1).with_voxel_size(0.1);
    let wide = BandPolicy {
        min_half_width: 8.0,
        ..BandPolicy::default()
    };
    let pipeline = OffsetPipeline::new(params).with_band_policy(wide);
    assert_relative_eq!(pipeline.half_width(), 8.0);

    let (grid, _) = pipeline.prepare(&unit_cube()).unwrap();
    assert_relative_eq!(grid.half_width(), 8.0);
    let default_grid = OffsetPipeline::new(params).prepare(&unit_cube()).unwrap().0;
    assert!(grid.active_voxel_count() > default_grid.active_voxel_count());
}

#[test]
fn extract_config_limits_output() {
    let params = OffsetParams::new(0.1).with_voxel_size(0.1);
    let pipeline = OffsetPipeline::new(params).with_extract_config(ExtractConfig {
        max_vertices: 10,
        ..ExtractConfig::default()
    });
    let err = pipeline.run(&unit_cube()).unwrap_err();
    assert!(matches!(
        err,
        OffsetError::LevelSet(LevelSetError::OutputTooLarge { limit: 10, .. })
    ));
}

#[test]
fn zero_offset_still_rebuilds_once() {
    let params = OffsetParams::new(0.0).with_voxel_size(0.1);
    assert_eq!(rebuild_calls(params), 1);
}

// =============================================================================
// Two-phase retrieval
// =============================================================================

#[test]
fn fetched_buffers_match_counts() {
    let (verts, tris) = cube_buffers();
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let handle = create(&MeshBuffers::new(&verts, &tris), &params).unwrap();

    let counts = handle.counts();
    assert!(counts.vertices > 0);
    assert!(counts.triangles > 0);

    let mut out_v = vec![f32::NAN; counts.vertices * 3];
    let mut out_t = vec![-1_i32; counts.triangles * 3];
    let written = handle
        .fetch(OutputBuffers::new(&mut out_v, &mut out_t))
        .unwrap();

    assert_eq!(written, counts);
    assert!(out_v.iter().all(|v| v.is_finite()));
    let vertex_count = i32::try_from(counts.vertices).unwrap();
    assert!(out_t.iter().all(|&i| (0..vertex_count).contains(&i)));

    let rebuilt = IndexedMesh::from_flat(&out_v, &out_t).unwrap();
    assert_relative_eq!(
        rebuilt.signed_volume(),
        handle.mesh().signed_volume(),
        epsilon = 1e-4
    );
    handle.release();
}

#[test]
fn small_buffers_are_left_untouched() {
    let (verts, tris) = cube_buffers();
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let handle = create(&MeshBuffers::new(&verts, &tris), &params).unwrap();
    let counts = handle.counts();

    let mut out_v = vec![7.0_f32; (counts.vertices - 1) * 3];
    let mut out_t = vec![7_i32; counts.triangles * 3];
    let err = handle
        .fetch(OutputBuffers::new(&mut out_v, &mut out_t))
        .unwrap_err();

    assert_eq!(err.code(), 6);
    assert!(matches!(err, OffsetError::CapacityTooSmall { .. }));
    assert!(out_v.iter().all(|&v| v == 7.0));
    assert!(out_t.iter().all(|&i| i == 7));

    // The handle survives a failed fetch
    let mut out_v = vec![0.0_f32; counts.vertices * 3];
    assert_eq!(
        handle
            .fetch(OutputBuffers::new(&mut out_v, &mut out_t))
            .unwrap(),
        counts
    );
}

#[test]
fn declared_capacity_below_length_is_respected() {
    let (verts, tris) = cube_buffers();
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let handle = create(&MeshBuffers::new(&verts, &tris), &params).unwrap();
    let counts = handle.counts();

    let mut out_v = vec![0.0_f32; counts.vertices * 3];
    let mut out_t = vec![0_i32; counts.triangles * 3];
    let declared = OutputBuffers {
        triangle_capacity: 1,
        ..OutputBuffers::new(&mut out_v, &mut out_t)
    };
    assert_eq!(handle.fetch(declared).unwrap_err().code(), 6);
}

#[test]
fn validation_runs_before_computation() {
    let (verts, tris) = cube_buffers();
    let buffers = MeshBuffers::new(&verts, &tris);

    let bad_radius = OffsetParams::new(0.2)
        .with_voxel_size(0.1)
        .with_smoothing_before(1, 0.0);
    assert_eq!(create(&buffers, &bad_radius).unwrap_err().code(), 1);

    let no_triangles = MeshBuffers {
        triangles: None,
        ..buffers
    };
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    assert_eq!(create(&no_triangles, &params).unwrap_err().code(), 2);

    let mut nan_verts = verts.clone();
    nan_verts[0] = f32::NAN;
    let err = create(&MeshBuffers::new(&nan_verts, &tris), &params).unwrap_err();
    assert_eq!(err.code(), 3);
}

#[test]
fn zero_offset_without_voxel_size_is_rejected() {
    let (verts, tris) = cube_buffers();
    let err = create(&MeshBuffers::new(&verts, &tris), &OffsetParams::new(0.0)).unwrap_err();
    assert_eq!(err.code(), 1);
}

#[test]
fn computation_failures_surface_as_level_set_errors() {
    let (verts, tris) = cube_buffers();
    let pipeline = OffsetPipeline::new(OffsetParams::new(0.2).with_voxel_size(0.1))
        .with_max_active_voxels(100);
    let err = create_with(&MeshBuffers::new(&verts, &tris), &pipeline).unwrap_err();
    assert_eq!(err.code(), 100);
    assert!(matches!(err, OffsetError::LevelSet(_)));
}

#[test]
fn empty_mesh_yields_empty_result() {
    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    let handle = create(&MeshBuffers::new(&[], &[]), &params).unwrap();
    assert_eq!(handle.counts().vertices, 0);
    assert_eq!(handle.counts().triangles, 0);
    assert_eq!(
        handle
            .fetch(OutputBuffers::new(&mut [], &mut []))
            .unwrap()
            .triangles,
        0
    );
}
