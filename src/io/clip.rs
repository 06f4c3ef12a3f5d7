use crate::config::ClipBackend;
use crate::io::raster::RasterReader;
use crate::types::{
    BoundingBox, Crs, GeoTransform, HeightmapError, HeightmapResult, RasterDataset, RasterGrid,
};
use gdal::Dataset;
use ndarray::Array2;
use std::path::Path;
use std::process::Command;
use tempfile::TempPath;

/// Tolerance in pixels when snapping bounds to the source grid
const WINDOW_EPSILON: f64 = 1e-9;

/// A clipped raster living in a temporary file.
///
/// The file is deleted when the handle is dropped, so every exit path of a
/// run (success, error or cancellation) releases it. `load` consumes the
/// handle: a clipped raster is read exactly once.
#[derive(Debug)]
pub struct ClippedRaster {
    label: String,
    path: TempPath,
}

impl ClippedRaster {
    fn new(label: String, path: TempPath) -> Self {
        Self { label, path }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Geographic extent of the clipped raster, `None` for projected rasters
    pub fn extent(&self) -> HeightmapResult<Option<BoundingBox>> {
        RasterReader::read_extent(&self.path).map_err(|e| self.unreadable(e))
    }

    /// Read the clipped raster into memory and delete its backing file.
    pub fn load(self) -> HeightmapResult<RasterDataset> {
        let dataset = RasterReader::read(&self.path).map_err(|e| self.unreadable(e))?;

        log::debug!("Releasing clipped {} at {}", self.label, self.path.display());
        self.path.close()?;
        Ok(dataset)
    }

    fn unreadable(&self, error: HeightmapError) -> HeightmapError {
        HeightmapError::ClipFailure {
            dataset: self.label.clone(),
            reason: format!("clipped raster is unreadable: {}", error),
        }
    }
}

/// Produces a raster limited to a geographic bounding box
pub trait RasterClipper {
    fn clip(&self, source: &Path, bbox: &BoundingBox) -> HeightmapResult<ClippedRaster>;
}

/// Build the clipper selected by the configuration
pub fn clipper_for(backend: &ClipBackend) -> Box<dyn RasterClipper> {
    match backend {
        ClipBackend::Gdal => Box::new(GdalClipper),
        ClipBackend::Command { program, extra_args } => {
            Box::new(CommandClipper::new(program.clone(), extra_args.clone()))
        }
    }
}

fn dataset_label(source: &Path) -> String {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}

fn temp_raster_path() -> HeightmapResult<TempPath> {
    let file = tempfile::Builder::new()
        .prefix("heightmap-clip-")
        .suffix(".tif")
        .tempfile()?;
    Ok(file.into_temp_path())
}

/// Verify the clip step left a non-empty file behind
fn ensure_written(label: &str, path: &Path) -> HeightmapResult<()> {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(HeightmapError::ClipFailure {
            dataset: label.to_string(),
            reason: "clip produced an empty or missing raster".to_string(),
        });
    }
    log::debug!("Clipped {} written: {} bytes", label, size);
    Ok(())
}

/// Pixel window `(col, row, width, height)` of a grid covering `bbox`, or
/// `None` when the box misses the grid.
pub fn pixel_window(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    bbox: &BoundingBox,
) -> HeightmapResult<Option<(usize, usize, usize, usize)>> {
    if transform.rotation_x != 0.0 || transform.rotation_y != 0.0 {
        return Err(HeightmapError::Processing(
            "Rotated rasters cannot be window-clipped".to_string(),
        ));
    }

    let inverse = transform.invert()?;
    let (c0, r0) = inverse.apply(bbox.west, bbox.north);
    let (c1, r1) = inverse.apply(bbox.east, bbox.south);

    let col_start = (c0.min(c1) + WINDOW_EPSILON).floor().max(0.0);
    let col_end = (c0.max(c1) - WINDOW_EPSILON).ceil().min(width as f64);
    let row_start = (r0.min(r1) + WINDOW_EPSILON).floor().max(0.0);
    let row_end = (r0.max(r1) - WINDOW_EPSILON).ceil().min(height as f64);

    if col_end <= col_start || row_end <= row_start {
        return Ok(None);
    }

    Ok(Some((
        col_start as usize,
        row_start as usize,
        (col_end - col_start) as usize,
        (row_end - row_start) as usize,
    )))
}

/// Clips by reading the covering pixel window through GDAL.
///
/// Only geographic (lon/lat) sources are supported.
pub struct GdalClipper;

impl RasterClipper for GdalClipper {
    fn clip(&self, source: &Path, bbox: &BoundingBox) -> HeightmapResult<ClippedRaster> {
        let label = dataset_label(source);
        log::info!("Clipping {} to {}", label, bbox);

        let dataset = Dataset::open(source).map_err(|e| HeightmapError::ClipFailure {
            dataset: label.clone(),
            reason: e.to_string(),
        })?;
        if RasterReader::read_crs(&dataset, source) != Crs::Wgs84 {
            return Err(HeightmapError::ClipFailure {
                dataset: label,
                reason: "in-process clipping needs a lon/lat (EPSG:4326) source, use the command backend"
                    .to_string(),
            });
        }
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();

        let extent = transform.bounds(width, height);
        if !bbox.intersects(&extent) {
            return Err(HeightmapError::InvalidBoundingBox(format!(
                "{} does not intersect {} extent {}", bbox, label, extent
            )));
        }

        let (col, row, win_width, win_height) = pixel_window(&transform, width, height, bbox)?
            .ok_or_else(|| HeightmapError::ClipFailure {
                dataset: label.clone(),
                reason: format!("{} covers no whole pixel", bbox),
            })?;
        log::debug!(
            "{} window: col {} row {} size {}x{}",
            label, col, row, win_width, win_height
        );

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value();
        let band_data = rasterband.read_as::<f32>(
            (col as isize, row as isize),
            (win_width, win_height),
            (win_width, win_height),
            None,
        )?;
        let samples = Array2::from_shape_vec((win_height, win_width), band_data.data)
            .map_err(|e| HeightmapError::Processing(format!("Failed to reshape clip window: {}", e)))?;

        let (top_left_x, top_left_y) = transform.apply(col as f64, row as f64);
        let grid = RasterGrid {
            width: win_width,
            height: win_height,
            transform: GeoTransform { top_left_x, top_left_y, ..transform },
            crs: Crs::Wgs84,
        };
        let clipped = RasterDataset::new(grid, samples, nodata)?;

        let path = temp_raster_path()?;
        RasterReader::write_geotiff(&clipped, &path)?;
        ensure_written(&label, &path)?;

        Ok(ClippedRaster::new(label, path))
    }
}

/// Clips by running an external `rio clip`-compatible command:
/// `<program> clip <src> <dst> --overwrite --geographic --bounds "w s e n"`
pub struct CommandClipper {
    program: String,
    extra_args: Vec<String>,
}

impl CommandClipper {
    pub fn new(program: String, extra_args: Vec<String>) -> Self {
        Self { program, extra_args }
    }

    fn command(&self, source: &Path, destination: &Path, bbox: &BoundingBox) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("clip")
            .arg(source)
            .arg(destination)
            .arg("--overwrite")
            .arg("--geographic")
            .arg("--bounds")
            .arg(bbox.to_bounds_arg())
            .args(&self.extra_args);
        command
    }
}

impl RasterClipper for CommandClipper {
    fn clip(&self, source: &Path, bbox: &BoundingBox) -> HeightmapResult<ClippedRaster> {
        let label = dataset_label(source);
        log::info!("Clipping {} to {} with `{}`", label, bbox, self.program);

        let path = temp_raster_path()?;
        let output = self
            .command(source, &path, bbox)
            .output()
            .map_err(|e| HeightmapError::ClipFailure {
                dataset: label.clone(),
                reason: format!("could not run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HeightmapError::ClipFailure {
                dataset: label,
                reason: format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            });
        }

        ensure_written(&label, &path)?;
        Ok(ClippedRaster::new(label, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RasterGrid;
    use ndarray::Array2;
    use std::path::PathBuf;

    fn write_global_raster(dir: &Path) -> PathBuf {
        // 1 degree cells over [0, 10] x [40, 50]
        let grid = RasterGrid::geographic(10, 10, GeoTransform::north_up(0.0, 50.0, 1.0, 1.0));
        let data = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f32);
        let raster = RasterDataset::new(grid, data, None).unwrap();
        let path = dir.join("source.tif");
        RasterReader::write_geotiff(&raster, &path).unwrap();
        path
    }

    #[test]
    fn test_pixel_window_snaps_to_grid() {
        let transform = GeoTransform::north_up(0.0, 50.0, 1.0, 1.0);
        let bbox = BoundingBox::new(2.5, 44.0, 5.0, 47.2);
        let window = pixel_window(&transform, 10, 10, &bbox).unwrap();
        assert_eq!(window, Some((2, 2, 3, 4)));
    }

    #[test]
    fn test_pixel_window_clamps_and_misses() {
        let transform = GeoTransform::north_up(0.0, 50.0, 1.0, 1.0);
        let window = pixel_window(&transform, 10, 10, &BoundingBox::new(-5.0, 30.0, 3.0, 60.0)).unwrap();
        assert_eq!(window, Some((0, 0, 3, 10)));

        let miss = pixel_window(&transform, 10, 10, &BoundingBox::new(20.0, 40.0, 30.0, 50.0)).unwrap();
        assert_eq!(miss, None);
    }

    #[test]
    fn test_gdal_clip_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_global_raster(dir.path());

        let clipped = GdalClipper
            .clip(&source, &BoundingBox::new(2.0, 44.0, 5.0, 47.0))
            .unwrap();
        let clip_path = clipped.path().to_path_buf();
        assert!(clip_path.exists());
        assert_eq!(clipped.label(), "source.tif");

        let raster = clipped.load().unwrap();
        assert!(!clip_path.exists(), "clipped file must be deleted after load");
        assert_eq!((raster.width(), raster.height()), (3, 3));
        // row 3, col 2 of the source
        assert_eq!(raster.data[[0, 0]], 32.0);
        assert_eq!(raster.grid.transform.top_left_x, 2.0);
        assert_eq!(raster.grid.transform.top_left_y, 47.0);
    }

    #[test]
    fn test_dropped_clip_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_global_raster(dir.path());

        let clipped = GdalClipper
            .clip(&source, &BoundingBox::new(1.0, 41.0, 3.0, 43.0))
            .unwrap();
        let clip_path = clipped.path().to_path_buf();
        drop(clipped);
        assert!(!clip_path.exists());
    }

    #[test]
    fn test_non_intersecting_box() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_global_raster(dir.path());

        let result = GdalClipper.clip(&source, &BoundingBox::new(100.0, -10.0, 110.0, 0.0));
        assert!(matches!(result, Err(HeightmapError::InvalidBoundingBox(_))));
    }

    #[test]
    fn test_missing_command_is_clip_failure() {
        let clipper = CommandClipper::new("definitely-not-a-clip-tool".to_string(), vec![]);
        let result = clipper.clip(Path::new("in.tif"), &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(result, Err(HeightmapError::ClipFailure { .. })));
    }

    #[test]
    fn test_failing_command_is_clip_failure() {
        // `false` ignores its arguments and exits non-zero
        let clipper = CommandClipper::new("false".to_string(), vec![]);
        let result = clipper.clip(Path::new("in.tif"), &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(result, Err(HeightmapError::ClipFailure { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_command_output_is_clip_failure() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in tool that writes a non-raster file to its destination
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("junk-clip");
        std::fs::write(&tool, "#!/bin/sh\necho garbage > \"$3\"\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let clipper = CommandClipper::new(tool.display().to_string(), vec![]);
        let clipped = clipper
            .clip(Path::new("water.tif"), &BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            .unwrap();
        let clip_path = clipped.path().to_path_buf();

        match clipped.extent() {
            Err(HeightmapError::ClipFailure { dataset, .. }) => assert_eq!(dataset, "water.tif"),
            other => panic!("expected ClipFailure, got {:?}", other),
        }
        assert!(matches!(clipped.load(), Err(HeightmapError::ClipFailure { .. })));
        assert!(!clip_path.exists());
    }

    #[test]
    fn test_succeeding_command_without_output_is_clip_failure() {
        // `true` exits zero but leaves the temporary file empty
        let clipper = CommandClipper::new("true".to_string(), vec![]);
        let result = clipper.clip(Path::new("in.tif"), &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(result, Err(HeightmapError::ClipFailure { .. })));
    }
}
