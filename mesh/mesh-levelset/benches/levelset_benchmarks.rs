//! Benchmarks for the level-set stages.
//!
//! Run with: cargo bench -p mesh-levelset

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mesh_levelset::{
    ExtractConfig, RasterizeConfig, extract_surface, mesh_to_level_set, offset, rebuild, smooth,
};
use mesh_types::unit_cube;

// =============================================================================
// Stage Benchmarks
// =============================================================================

fn bench_rasterize(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize");
    let cube = unit_cube();

    for voxel_size in [0.05, 0.02] {
        group.bench_with_input(
            BenchmarkId::from_parameter(voxel_size),
            &voxel_size,
            |b, &vs| {
                b.iter(|| mesh_to_level_set(black_box(&cube), vs, &RasterizeConfig::default()));
            },
        );
    }

    group.finish();
}

fn bench_band_operators(c: &mut Criterion) {
    let config = RasterizeConfig::default().with_half_width(5.0);
    let (grid, _) = mesh_to_level_set(&unit_cube(), 0.02, &config).unwrap();

    c.bench_function("smooth_r1_x2", |b| {
        b.iter(|| {
            let mut g = grid.clone();
            smooth(&mut g, 2, 1.0).unwrap();
            g
        });
    });

    c.bench_function("offset_then_rebuild", |b| {
        b.iter(|| {
            let mut g = grid.clone();
            offset(&mut g, 2.0).unwrap();
            rebuild(black_box(&g), 0.0, 5.0).unwrap()
        });
    });

    c.bench_function("extract_surface", |b| {
        b.iter(|| extract_surface(black_box(&grid), &ExtractConfig::default()).unwrap());
    });
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(benches, bench_rasterize, bench_band_operators);
criterion_main!(benches);
