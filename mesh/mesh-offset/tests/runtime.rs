//! Process-wide runtime lifecycle.
//!
//! Kept in its own test binary so shutting the pool down cannot interfere
//! with pipelines running in other tests.

use std::sync::Barrier;
use std::thread;

use mesh_offset::runtime::{self, RuntimeConfig};
use mesh_offset::{OffsetParams, offset_mesh};
use mesh_types::unit_cube;

#[test]
fn runtime_lifecycle() {
    runtime::shutdown();
    assert!(!runtime::is_initialized());

    // Concurrent initialization creates exactly one pool
    let barrier = Barrier::new(8);
    let created = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    runtime::initialize(&RuntimeConfig::default().with_num_threads(2)).unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count()
    });
    assert_eq!(created, 1);
    assert!(runtime::is_initialized());

    let params = OffsetParams::new(0.2).with_voxel_size(0.1);
    assert!(offset_mesh(&unit_cube(), &params).unwrap().face_count() > 0);

    // Shutdown, then the next request brings the pool back lazily
    assert!(runtime::shutdown());
    assert!(!runtime::shutdown());
    assert!(!runtime::is_initialized());
    assert!(offset_mesh(&unit_cube(), &params).unwrap().face_count() > 0);
    assert!(runtime::is_initialized());

    // Explicit re-initialization after shutdown
    assert!(runtime::shutdown());
    assert!(runtime::initialize(&RuntimeConfig::default().with_num_threads(1)).unwrap());
    assert!(!runtime::initialize(&RuntimeConfig::default()).unwrap());
}
