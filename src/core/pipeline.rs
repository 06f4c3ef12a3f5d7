//! Pipeline orchestration: clip, sample, mask, overlay, derive normals, encode

use crate::config::HeightmapConfig;
use crate::core::cancel::CancellationToken;
use crate::core::heightmap::sample_heightmap;
use crate::core::normal_map::{to_normal_map, NormalMapParams};
use crate::core::normalize::ElevationNormalizer;
use crate::core::rivers::overlay_rivers;
use crate::core::water_mask::apply_water_mask;
use crate::io::clip::{clipper_for, RasterClipper};
use crate::io::encode::save_image;
use crate::io::raster::RasterReader;
use crate::types::{BoundingBox, ElevationStats, HeightmapError, HeightmapImage, HeightmapResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How water is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceMode {
    /// Elevation as sampled, bathymetry included (subject to the floor)
    Bathymetry,
    /// Water pixels forced to sea level
    FlattenWater,
    /// Water flattened and rivers burned in at the river grid resolution
    FlattenWaterWithRivers,
}

impl SurfaceMode {
    pub fn flattens_water(&self) -> bool {
        !matches!(self, SurfaceMode::Bathymetry)
    }

    pub fn includes_rivers(&self) -> bool {
        matches!(self, SurfaceMode::FlattenWaterWithRivers)
    }
}

/// Final image kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Heightmap,
    NormalMap,
}

/// Legal combination of rendering options for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub surface: SurfaceMode,
    pub output: OutputKind,
    /// Elevations below this many metres are raised to it
    pub min_elevation: Option<i32>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            surface: SurfaceMode::Bathymetry,
            output: OutputKind::Heightmap,
            min_elevation: None,
        }
    }
}

impl RenderOptions {
    /// Build options from the three independent switches of the legacy UI.
    /// Rivers without water flattening have no effect and are dropped.
    pub fn from_flags(
        flatten_water: bool,
        include_rivers: bool,
        normal_map: bool,
        min_elevation: Option<i32>,
    ) -> Self {
        let surface = match (flatten_water, include_rivers) {
            (true, true) => SurfaceMode::FlattenWaterWithRivers,
            (true, false) => SurfaceMode::FlattenWater,
            (false, include_rivers) => {
                if include_rivers {
                    log::warn!("Rivers are only drawn when water is flattened; ignoring");
                }
                SurfaceMode::Bathymetry
            }
        };
        let output = if normal_map {
            OutputKind::NormalMap
        } else {
            OutputKind::Heightmap
        };
        Self { surface, output, min_elevation }
    }
}

/// Pipeline states, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Idle,
    Clipping,
    Sampling,
    Masking,
    Overlaying,
    NormalMapping,
    Encoding,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Clipping => "clipping",
            PipelineStage::Sampling => "sampling",
            PipelineStage::Masking => "masking",
            PipelineStage::Overlaying => "overlaying",
            PipelineStage::NormalMapping => "normal mapping",
            PipelineStage::Encoding => "encoding",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub width: u32,
    pub height: u32,
    pub max_elevation: f64,
    pub flattened_pixels: usize,
    /// Every stage the run passed through
    pub stages: Vec<PipelineStage>,
}

struct StageTrail {
    stages: Vec<PipelineStage>,
}

impl StageTrail {
    fn new() -> Self {
        Self { stages: vec![PipelineStage::Idle] }
    }

    fn current(&self) -> PipelineStage {
        self.stages.last().copied().unwrap_or(PipelineStage::Idle)
    }

    fn enter(&mut self, stage: PipelineStage) {
        log::info!("Pipeline stage: {} -> {}", self.current(), stage);
        self.stages.push(stage);
    }

    fn fail(&mut self, error: &HeightmapError) {
        log::error!("Heightmap run failed during {}: {}", self.current(), error);
        self.stages.push(PipelineStage::Failed);
    }
}

/// One heightmap request from the UI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightmapRequest {
    pub bbox: BoundingBox,
    pub options: RenderOptions,
}

/// Sequences the raster stages for a bounding box.
///
/// Runs are synchronous and single-threaded. Clipped rasters are owned by
/// the run and deleted once consumed or when the run exits early.
pub struct HeightmapPipeline {
    config: HeightmapConfig,
    clipper: Box<dyn RasterClipper>,
}

impl HeightmapPipeline {
    pub fn new(config: HeightmapConfig) -> HeightmapResult<Self> {
        let clipper = clipper_for(&config.clip);
        Self::with_clipper(config, clipper)
    }

    pub fn with_clipper(config: HeightmapConfig, clipper: Box<dyn RasterClipper>) -> HeightmapResult<Self> {
        config.validate()?;
        Ok(Self { config, clipper })
    }

    pub fn config(&self) -> &HeightmapConfig {
        &self.config
    }

    /// Render the requested image in memory
    pub fn render(
        &self,
        request: &HeightmapRequest,
        cancel: &CancellationToken,
    ) -> HeightmapResult<(HeightmapImage, RenderReport)> {
        let mut trail = StageTrail::new();
        match self.render_stages(request, cancel, &mut trail) {
            Ok(result) => Ok(result),
            Err(e) => {
                trail.fail(&e);
                Err(e)
            }
        }
    }

    /// Render and encode to `destination`. Nothing is written there on failure.
    pub fn run<P: AsRef<Path>>(
        &self,
        request: &HeightmapRequest,
        destination: P,
        cancel: &CancellationToken,
    ) -> HeightmapResult<RenderReport> {
        let mut trail = StageTrail::new();
        let result = self
            .render_stages(request, cancel, &mut trail)
            .and_then(|(image, report)| {
                trail.enter(PipelineStage::Encoding);
                cancel.check()?;
                save_image(&image, destination.as_ref())?;
                Ok(report)
            });

        match result {
            Ok(mut report) => {
                trail.enter(PipelineStage::Done);
                report.stages = trail.stages;
                log::info!(
                    "Heightmap written to {} ({}x{})",
                    destination.as_ref().display(), report.width, report.height
                );
                Ok(report)
            }
            Err(e) => {
                trail.fail(&e);
                Err(e)
            }
        }
    }

    fn render_stages(
        &self,
        request: &HeightmapRequest,
        cancel: &CancellationToken,
        trail: &mut StageTrail,
    ) -> HeightmapResult<(HeightmapImage, RenderReport)> {
        let options = request.options;
        request.bbox.validate()?;
        log::info!("Generating heightmap for {} with {:?}", request.bbox, options);

        let datasets = &self.config.datasets;
        let mut sources = vec![datasets.water_mask.as_path(), datasets.elevation.as_path()];
        if options.surface.includes_rivers() {
            sources.push(datasets.rivers.as_path());
        }
        check_coverage(&request.bbox, &sources)?;

        trail.enter(PipelineStage::Clipping);
        let water_clip = self.clipper.clip(&datasets.water_mask, &request.bbox)?;
        // The output grid is the clipped water mask, whose pixels can reach
        // past the box; the elevation clip must cover all of them.
        let elevation_bbox = match water_clip.extent()? {
            Some(extent) => request.bbox.union(&extent),
            None => request.bbox,
        };
        let elevation_clip = self.clipper.clip(&datasets.elevation, &elevation_bbox)?;
        let river_clip = if options.surface.includes_rivers() {
            Some(self.clipper.clip(&datasets.rivers, &request.bbox)?)
        } else {
            None
        };
        cancel.check()?;

        trail.enter(PipelineStage::Sampling);
        let elevation = elevation_clip.load()?;
        let water_mask = water_clip.load()?;
        let stats = ElevationStats::from_dataset(&elevation)?;
        let normalizer = ElevationNormalizer::new(&stats, options.min_elevation, self.config.rounding)?;
        let mut image = sample_heightmap(&elevation, &water_mask.grid, &normalizer, cancel)?;
        drop(elevation);

        let mut flattened_pixels = 0;
        if options.surface.flattens_water() {
            trail.enter(PipelineStage::Masking);
            flattened_pixels =
                apply_water_mask(&mut image, &water_mask, self.config.water_sentinel, cancel)?;
        }
        drop(water_mask);

        if let Some(river_clip) = river_clip {
            trail.enter(PipelineStage::Overlaying);
            let rivers = river_clip.load()?;
            image = overlay_rivers(&image, &rivers, self.config.upscale_factor, cancel)?;
        }

        if options.output == OutputKind::NormalMap {
            trail.enter(PipelineStage::NormalMapping);
            let params = NormalMapParams {
                strength: self.config.normal_strength,
                border: self.config.normal_border,
            };
            image = to_normal_map(&image, &params, cancel)?;
        }

        let report = RenderReport {
            width: image.width(),
            height: image.height(),
            max_elevation: stats.max_elevation,
            flattened_pixels,
            stages: trail.stages.clone(),
        };
        Ok((image, report))
    }
}

/// Reject a box that misses any source raster before a clip backend runs.
/// Sources whose extent cannot be read here are left to the clipper to report.
fn check_coverage(bbox: &BoundingBox, sources: &[&Path]) -> HeightmapResult<()> {
    for source in sources {
        match RasterReader::read_extent(source) {
            Ok(Some(extent)) if !bbox.intersects(&extent) => {
                return Err(HeightmapError::InvalidBoundingBox(format!(
                    "{} does not intersect {} extent {}",
                    bbox,
                    source.display(),
                    extent
                )));
            }
            Ok(_) => {}
            Err(e) => log::debug!("Extent of {} not checked: {}", source.display(), e),
        }
    }
    Ok(())
}
