use crate::types::{
    BoundingBox, Crs, GeoTransform, HeightmapError, HeightmapResult, RasterDataset, RasterGrid,
};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Reader/writer for single-band GeoTIFF rasters
pub struct RasterReader;

impl RasterReader {
    /// Open a raster and read its first band into memory
    pub fn read<P: AsRef<Path>>(path: P) -> HeightmapResult<RasterDataset> {
        log::debug!("Opening raster: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();

        if width == 0 || height == 0 {
            return Err(HeightmapError::Processing(format!(
                "Raster {} is empty ({}x{})",
                path.as_ref().display(), width, height
            )));
        }

        let crs = Self::read_crs(&dataset, path.as_ref());
        log::debug!("Raster size: {}x{}, geotransform: {:?}", width, height, geo_transform);

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value();
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let samples = Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| HeightmapError::Processing(format!("Failed to reshape raster data: {}", e)))?;

        let grid = RasterGrid {
            width,
            height,
            transform: GeoTransform::from_gdal(geo_transform),
            crs,
        };
        RasterDataset::new(grid, samples, nodata)
    }

    /// Geographic extent of a raster without reading its samples.
    /// `None` when the raster is not in WGS84.
    pub fn read_extent<P: AsRef<Path>>(path: P) -> HeightmapResult<Option<BoundingBox>> {
        let dataset = Dataset::open(path.as_ref())?;
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();

        match Self::read_crs(&dataset, path.as_ref()) {
            Crs::Wgs84 => Ok(Some(transform.bounds(width, height))),
            Crs::Other { .. } => Ok(None),
        }
    }

    /// Resolve the dataset CRS; rasters without one are taken as geographic.
    pub(crate) fn read_crs(dataset: &Dataset, path: &Path) -> Crs {
        let srs = match dataset.spatial_ref() {
            Ok(srs) => srs,
            Err(_) => {
                log::warn!("{} has no CRS, assuming WGS84 lon/lat", path.display());
                return Crs::Wgs84;
            }
        };

        let is_wgs84 = SpatialRef::from_epsg(4326)
            .map(|wgs84| wgs84 == srs)
            .unwrap_or(false);

        if is_wgs84 {
            Crs::Wgs84
        } else {
            match srs.to_wkt() {
                Ok(wkt) => Crs::Other { wkt },
                Err(e) => {
                    log::warn!("Could not export CRS of {} ({}), assuming WGS84", path.display(), e);
                    Crs::Wgs84
                }
            }
        }
    }

    /// Write a raster as a single-band float GeoTIFF
    pub fn write_geotiff<P: AsRef<Path>>(raster: &RasterDataset, output_path: P) -> HeightmapResult<()> {
        log::debug!("Writing GeoTIFF: {}", output_path.as_ref().display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = raster.data.dim();

        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path.as_ref(),
            width as isize,
            height as isize,
            1,
        )?;

        dataset.set_geo_transform(&raster.grid.transform.to_gdal())?;

        let srs = match &raster.grid.crs {
            Crs::Wgs84 => SpatialRef::from_epsg(4326)?,
            Crs::Other { wkt } => SpatialRef::from_wkt(wkt)?,
        };
        dataset.set_spatial_ref(&srs)?;

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<f32> = raster.data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;

        if let Some(nodata) = raster.nodata {
            rasterband.set_no_data_value(Some(nodata))?;
        }

        Ok(())
    }
}
