//! The offset pipeline.
//!
//! Stages run in a fixed order, each consuming the grid the previous one
//! produced:
//!
//! 1. Rasterize the mesh into a band
//! 2. Smooth (skipped with zero iterations)
//! 3. Rebuild if the smoothing crossed the drift threshold
//! 4. Offset (skipped for a zero offset)
//! 5. Rebuild, always
//! 6. Smooth (skipped with zero iterations)
//! 7. Rebuild if the smoothing crossed the drift threshold
//! 8. Extract the zero level
//!
//! Any stage failure aborts the run; no partial mesh is returned.

use std::fmt;

use mesh_levelset::{
    ExtractConfig, FastMarchingRebuild, NarrowBandGrid, RasterizeConfig, Reinitialize,
    extract_surface, mesh_to_level_set, offset, smooth,
};
use mesh_types::IndexedMesh;
use tracing::{debug, info, warn};

use crate::error::OffsetResult;
use crate::params::OffsetParams;
use crate::policy::{BandPolicy, RebuildPolicy};
use crate::runtime;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Mesh to band.
    Rasterize,
    /// Smoothing before the offset.
    SmoothBefore,
    /// Conditional rebuild after the first smoothing.
    RebuildBefore,
    /// Constant offset.
    Offset,
    /// Unconditional rebuild after the offset.
    Rebuild,
    /// Smoothing after the offset.
    SmoothAfter,
    /// Conditional rebuild after the second smoothing.
    RebuildAfter,
    /// Band to mesh.
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rasterize => "rasterize",
            Self::SmoothBefore => "smooth-before",
            Self::RebuildBefore => "rebuild-before",
            Self::Offset => "offset",
            Self::Rebuild => "rebuild",
            Self::SmoothAfter => "smooth-after",
            Self::RebuildAfter => "rebuild-after",
            Self::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// What a pipeline run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    /// Voxel size used, after defaulting.
    pub voxel_size: f64,
    /// Band half width in voxels.
    pub half_width: f32,
    /// Stages executed, in order.
    pub stages: Vec<Stage>,
    /// Number of reinitializations.
    pub rebuilds: usize,
    /// Degenerate triangles skipped by the rasterizer.
    pub skipped_triangles: usize,
    /// Active voxels right after rasterization.
    pub rasterized_voxels: usize,
    /// Active voxels entering extraction.
    pub final_voxels: usize,
    /// Output vertex count.
    pub vertex_count: usize,
    /// Output triangle count.
    pub triangle_count: usize,
}

impl PipelineReport {
    fn record(&mut self, stage: Stage, grid: &NarrowBandGrid) {
        let active = grid.active_voxel_count();
        debug!("Stage {}: {} active voxels", stage, active);
        self.stages.push(stage);
        self.final_voxels = active;
        if matches!(
            stage,
            Stage::RebuildBefore | Stage::Rebuild | Stage::RebuildAfter
        ) {
            self.rebuilds += 1;
        }
    }

    /// Whether `stage` ran.
    #[must_use]
    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct OffsetOutput {
    /// Offset surface.
    pub mesh: IndexedMesh,
    /// Run statistics.
    pub report: PipelineReport,
}

/// Configured offset pipeline.
///
/// The reinitializer is a type parameter so it can be swapped, for example
/// for a counting fake in tests.
///
/// # Example
///
/// ```
/// use mesh_offset::{OffsetParams, OffsetPipeline};
/// use mesh_types::unit_cube;
///
/// let params = OffsetParams::new(0.2).with_voxel_size(0.1);
/// let output = OffsetPipeline::new(params).run(&unit_cube()).unwrap();
///
/// assert!(output.mesh.face_count() > 0);
/// assert!(output.mesh.signed_volume() > 1.0);
/// assert_eq!(output.report.rebuilds, 1);
/// ```
#[derive(Debug, Clone)]
pub struct OffsetPipeline<R: Reinitialize = FastMarchingRebuild> {
    params: OffsetParams,
    band: BandPolicy,
    rebuild: RebuildPolicy,
    rasterize: RasterizeConfig,
    extract: ExtractConfig,
    reinitializer: R,
}

impl OffsetPipeline {
    /// Pipeline with default policies and the fast-marching reinitializer.
    #[must_use]
    pub fn new(params: OffsetParams) -> Self {
        Self {
            params,
            band: BandPolicy::default(),
            rebuild: RebuildPolicy::default(),
            rasterize: RasterizeConfig::default(),
            extract: ExtractConfig::default(),
            reinitializer: FastMarchingRebuild::default(),
        }
    }
}

impl<R: Reinitialize> OffsetPipeline<R> {
    /// Replace the reinitializer.
    #[must_use]
    pub fn with_reinitializer<S: Reinitialize>(self, reinitializer: S) -> OffsetPipeline<S> {
        OffsetPipeline {
            params: self.params,
            band: self.band,
            rebuild: self.rebuild,
            rasterize: self.rasterize,
            extract: self.extract,
            reinitializer,
        }
    }

    /// Replace the band policy.
    #[must_use]
    pub const fn with_band_policy(mut self, band: BandPolicy) -> Self {
        self.band = band;
        self
    }

    /// Replace the rebuild policy.
    #[must_use]
    pub const fn with_rebuild_policy(mut self, rebuild: RebuildPolicy) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Limit the rasterized band size. The half width is always set by the
    /// band policy.
    #[must_use]
    pub const fn with_max_active_voxels(mut self, limit: usize) -> Self {
        self.rasterize.max_active_voxels = limit;
        self
    }

    /// Replace the extraction settings.
    #[must_use]
    pub fn with_extract_config(mut self, extract: ExtractConfig) -> Self {
        self.extract = extract;
        self
    }

    /// The request parameters.
    #[must_use]
    pub const fn params(&self) -> &OffsetParams {
        &self.params
    }

    /// The reinitializer.
    #[must_use]
    pub const fn reinitializer(&self) -> &R {
        &self.reinitializer
    }

    /// Band half width in voxels for these parameters.
    #[must_use]
    pub fn half_width(&self) -> f32 {
        self.band
            .voxel_half_width(&self.params, self.params.resolved_voxel_size())
    }

    /// Run the stages up to, but not including, the offset.
    ///
    /// The returned grid is the state the offset stage would receive.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or a stage fails.
    pub fn prepare(&self, mesh: &IndexedMesh) -> OffsetResult<(NarrowBandGrid, PipelineReport)> {
        self.params.validate()?;
        let pool = runtime::current()?;
        pool.install(|| self.prepare_stages(mesh))
    }

    /// Run every stage and return the offset surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or any stage fails.
    pub fn run(&self, mesh: &IndexedMesh) -> OffsetResult<OffsetOutput> {
        self.params.validate()?;
        let pool = runtime::current()?;
        pool.install(|| self.run_stages(mesh))
    }

    fn prepare_stages(&self, mesh: &IndexedMesh) -> OffsetResult<(NarrowBandGrid, PipelineReport)> {
        let p = &self.params;
        let voxel_size = p.resolved_voxel_size();
        let half_width = self.half_width();

        info!(
            "Offset: voxel_size={}, offset={}, before={}x{}, after={}x{}, half_width={}",
            voxel_size,
            p.offset,
            p.gaussian_it_before,
            p.gaussian_r_before,
            p.gaussian_it_after,
            p.gaussian_r_after,
            half_width
        );

        let mut report = PipelineReport {
            voxel_size,
            half_width,
            ..PipelineReport::default()
        };

        let config = self.rasterize.clone().with_half_width(half_width);
        let (mut grid, stats) = mesh_to_level_set(mesh, voxel_size, &config)?;
        report.skipped_triangles = stats.skipped_degenerate;
        report.rasterized_voxels = stats.active_voxels;
        report.record(Stage::Rasterize, &grid);

        if p.gaussian_it_before > 0 {
            smooth(&mut grid, p.gaussian_it_before, p.gaussian_r_before)?;
            report.record(Stage::SmoothBefore, &grid);
        }
        if self
            .rebuild
            .should_rebuild(p.gaussian_it_before, p.gaussian_r_before)
        {
            grid = self.reinitializer.rebuild(&grid, 0.0, half_width)?;
            report.record(Stage::RebuildBefore, &grid);
        }

        Ok((grid, report))
    }

    fn run_stages(&self, mesh: &IndexedMesh) -> OffsetResult<OffsetOutput> {
        let p = &self.params;
        let (mut grid, mut report) = self.prepare_stages(mesh)?;
        let half_width = report.half_width;

        if p.offset != 0.0 {
            #[allow(clippy::cast_possible_truncation)]
            let amount = (p.offset / report.voxel_size) as f32;
            offset(&mut grid, amount)?;
            report.record(Stage::Offset, &grid);
        }

        grid = self.reinitializer.rebuild(&grid, 0.0, half_width)?;
        report.record(Stage::Rebuild, &grid);

        if p.gaussian_it_after > 0 {
            smooth(&mut grid, p.gaussian_it_after, p.gaussian_r_after)?;
            report.record(Stage::SmoothAfter, &grid);
        }
        if self
            .rebuild
            .should_rebuild(p.gaussian_it_after, p.gaussian_r_after)
        {
            grid = self.reinitializer.rebuild(&grid, 0.0, half_width)?;
            report.record(Stage::RebuildAfter, &grid);
        }

        let surface = extract_surface(&grid, &self.extract)?;
        report.record(Stage::Extract, &grid);
        if surface.is_empty() {
            warn!("Offset produced an empty surface");
        }

        let mesh = surface.into_mesh();
        report.vertex_count = mesh.vertex_count();
        report.triangle_count = mesh.face_count();
        info!(
            "Offset complete: {} vertices, {} triangles, {} rebuilds",
            report.vertex_count, report.triangle_count, report.rebuilds
        );

        Ok(OffsetOutput { mesh, report })
    }
}

/// Offset a mesh with default policies.
///
/// # Errors
///
/// See [`OffsetPipeline::run`].
pub fn offset_mesh(mesh: &IndexedMesh, params: &OffsetParams) -> OffsetResult<IndexedMesh> {
    OffsetPipeline::new(*params).run(mesh).map(|output| output.mesh)
}
