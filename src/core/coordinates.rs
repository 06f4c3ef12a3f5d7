use crate::types::{Crs, GeoTransform, HeightmapError, HeightmapResult, RasterGrid};
use gdal::spatial_ref::{CoordTransform, SpatialRef};

/// Tolerance in pixels applied before flooring a fractional index
const INDEX_EPSILON: f64 = 1e-9;

/// Maps pixel positions of one raster grid to geographic coordinates and back.
///
/// Map coordinates come from the grid's affine transform. They are reprojected
/// to WGS84 only when the grid is in another CRS; for WGS84 grids they are
/// already lon/lat. The transforms are built once per grid, not per pixel.
pub struct CoordinateMapper {
    width: usize,
    height: usize,
    transform: GeoTransform,
    inverse: GeoTransform,
    to_wgs84: Option<CoordTransform>,
    from_wgs84: Option<CoordTransform>,
}

impl CoordinateMapper {
    pub fn new(grid: &RasterGrid) -> HeightmapResult<Self> {
        let inverse = grid.transform.invert()?;

        let (to_wgs84, from_wgs84) = match &grid.crs {
            Crs::Wgs84 => (None, None),
            Crs::Other { wkt } => {
                let native = SpatialRef::from_wkt(wkt)?;
                let wgs84 = SpatialRef::from_epsg(4326)?;
                // Keep x = lon, y = lat regardless of the authority axis order
                native.set_axis_mapping_strategy(
                    gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER,
                );
                wgs84.set_axis_mapping_strategy(
                    gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER,
                );
                (
                    Some(CoordTransform::new(&native, &wgs84)?),
                    Some(CoordTransform::new(&wgs84, &native)?),
                )
            }
        };

        Ok(Self {
            width: grid.width,
            height: grid.height,
            transform: grid.transform,
            inverse,
            to_wgs84,
            from_wgs84,
        })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Geographic `(lat, lon)` of the upper-left corner of pixel (x, y)
    pub fn pixel_to_geo(&self, x: usize, y: usize) -> HeightmapResult<(f64, f64)> {
        let (map_x, map_y) = self.transform.apply(x as f64, y as f64);

        match &self.to_wgs84 {
            None => Ok((map_y, map_x)),
            Some(ct) => {
                let (lon, lat) = Self::reproject(ct, map_x, map_y)?;
                Ok((lat, lon))
            }
        }
    }

    /// Unchecked `(row, col)` of the pixel containing a geographic coordinate.
    /// The result may lie outside the grid.
    pub fn geo_to_pixel(&self, lat: f64, lon: f64) -> HeightmapResult<(isize, isize)> {
        let (map_x, map_y) = match &self.from_wgs84 {
            None => (lon, lat),
            Some(ct) => Self::reproject(ct, lon, lat)?,
        };

        let (col, row) = self.inverse.apply(map_x, map_y);
        if !col.is_finite() || !row.is_finite() {
            return Err(HeightmapError::Processing(format!(
                "Coordinate ({}, {}) has no pixel position", lat, lon
            )));
        }
        Ok(((row + INDEX_EPSILON).floor() as isize, (col + INDEX_EPSILON).floor() as isize))
    }

    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    /// Resolve pixel (x, y) of `source` to the `(row, col)` of this grid
    /// covering the same geographic position.
    pub fn resolve_from(&self, source: &CoordinateMapper, x: usize, y: usize) -> HeightmapResult<(usize, usize)> {
        let (lat, lon) = source.pixel_to_geo(x, y)?;
        let (row, col) = self.geo_to_pixel(lat, lon)?;

        if !self.contains(row, col) {
            return Err(HeightmapError::CoordinateResolutionFailure {
                x,
                y,
                row,
                col,
                rows: self.height,
                cols: self.width,
            });
        }
        Ok((row as usize, col as usize))
    }

    fn reproject(ct: &CoordTransform, x: f64, y: f64) -> HeightmapResult<(f64, f64)> {
        let mut xs = [x];
        let mut ys = [y];
        let mut zs = [0.0];
        ct.transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok((xs[0], ys[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(width: usize, height: usize, west: f64, north: f64, size: f64) -> RasterGrid {
        RasterGrid::geographic(width, height, GeoTransform::north_up(west, north, size, size))
    }

    #[test]
    fn test_pixel_to_geo_uses_upper_left_corner() {
        let mapper = CoordinateMapper::new(&grid(10, 10, -5.0, 52.0, 0.5)).unwrap();
        let (lat, lon) = mapper.pixel_to_geo(2, 4).unwrap();
        assert_relative_eq!(lat, 50.0);
        assert_relative_eq!(lon, -4.0);
    }

    #[test]
    fn test_geo_to_pixel_floors() {
        let mapper = CoordinateMapper::new(&grid(10, 10, -5.0, 52.0, 0.5)).unwrap();
        assert_eq!(mapper.geo_to_pixel(50.0, -4.0).unwrap(), (4, 2));
        assert_eq!(mapper.geo_to_pixel(49.8, -3.9).unwrap(), (4, 2));
        assert_eq!(mapper.geo_to_pixel(53.0, -6.0).unwrap(), (-2, -2));
    }

    #[test]
    fn test_resolution_between_grids() {
        // Coarse grid of 1 degree cells and a fine grid of 0.25 degree cells
        // over the same region.
        let coarse = CoordinateMapper::new(&grid(4, 4, 0.0, 4.0, 1.0)).unwrap();
        let fine = CoordinateMapper::new(&grid(16, 16, 0.0, 4.0, 0.25)).unwrap();

        assert_eq!(fine.resolve_from(&coarse, 1, 2).unwrap(), (8, 4));
        assert_eq!(coarse.resolve_from(&fine, 7, 13).unwrap(), (3, 1));
        assert_eq!(coarse.resolve_from(&fine, 15, 15).unwrap(), (3, 3));
    }

    #[test]
    fn test_resolution_outside_grid_fails() {
        let small = CoordinateMapper::new(&grid(2, 2, 0.0, 2.0, 1.0)).unwrap();
        let wide = CoordinateMapper::new(&grid(6, 2, 0.0, 2.0, 1.0)).unwrap();

        match small.resolve_from(&wide, 4, 1) {
            Err(HeightmapError::CoordinateResolutionFailure { x, y, row, col, .. }) => {
                assert_eq!((x, y), (4, 1));
                assert_eq!((row, col), (1, 4));
            }
            other => panic!("expected CoordinateResolutionFailure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_projected_grid_is_reprojected() {
        let wkt = SpatialRef::from_epsg(3857).unwrap().to_wkt().unwrap();
        // Web Mercator grid whose origin sits on (0, 0)
        let mercator = RasterGrid {
            width: 10,
            height: 10,
            transform: GeoTransform::north_up(0.0, 0.0, 111_319.490_793_273_57, 111_319.490_793_273_57),
            crs: Crs::Other { wkt },
        };
        let mapper = CoordinateMapper::new(&mercator).unwrap();

        let (lat, lon) = mapper.pixel_to_geo(0, 0).unwrap();
        assert_relative_eq!(lat, 0.0, epsilon = 1e-9);
        assert_relative_eq!(lon, 0.0, epsilon = 1e-9);

        let (_, lon) = mapper.pixel_to_geo(1, 0).unwrap();
        assert_relative_eq!(lon, 1.0, epsilon = 1e-6);

        let (row, col) = mapper.geo_to_pixel(-0.5, 2.5).unwrap();
        assert_eq!((row, col), (0, 2));
    }
}
