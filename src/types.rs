use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw raster samples, indexed [row, col]
pub type RasterSamples = Array2<f32>;

/// Grayscale heightmap stored as RGB with equal channels
pub type HeightmapImage = image::RgbImage;

/// Tangent-space normal map, one encoded unit normal per pixel
pub type NormalMapImage = image::RgbImage;

/// Geographic bounding box in decimal degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }

    /// Check the box is finite, correctly ordered and on the globe.
    pub fn validate(&self) -> HeightmapResult<()> {
        let values = [self.west, self.south, self.east, self.north];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(HeightmapError::InvalidBoundingBox(format!(
                "non-finite coordinate in {}", self
            )));
        }
        if self.west >= self.east {
            return Err(HeightmapError::InvalidBoundingBox(format!(
                "west ({}) must be less than east ({})", self.west, self.east
            )));
        }
        if self.south >= self.north {
            return Err(HeightmapError::InvalidBoundingBox(format!(
                "south ({}) must be less than north ({})", self.south, self.north
            )));
        }
        if self.west < -180.0 || self.east > 180.0 || self.south < -90.0 || self.north > 90.0 {
            return Err(HeightmapError::InvalidBoundingBox(format!(
                "{} extends beyond [-180, 180] x [-90, 90]", self
            )));
        }
        Ok(())
    }

    /// True when the two boxes share a region of non-zero area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west < other.east
            && other.west < self.east
            && self.south < other.north
            && other.south < self.north
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Bounds in the order external clip tools expect: "west south east north"
    pub fn to_bounds_arg(&self) -> String {
        format!("{} {} {} {}", self.west, self.south, self.east, self.north)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[W {:.4}, S {:.4}, E {:.4}, N {:.4}]",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Affine pixel-to-map transformation (GDAL coefficient order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with no rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map a (column, row) pixel position to map coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Inverse transform, mapping map coordinates back to (column, row).
    pub fn invert(&self) -> HeightmapResult<GeoTransform> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return Err(HeightmapError::Processing(format!(
                "Geotransform is not invertible: {:?}", self
            )));
        }

        let inv_det = 1.0 / det;
        let a = self.pixel_height * inv_det;
        let b = -self.rotation_x * inv_det;
        let d = -self.rotation_y * inv_det;
        let e = self.pixel_width * inv_det;

        Ok(GeoTransform {
            top_left_x: -(a * self.top_left_x + b * self.top_left_y),
            pixel_width: a,
            rotation_x: b,
            top_left_y: -(d * self.top_left_x + e * self.top_left_y),
            rotation_y: d,
            pixel_height: e,
        })
    }

    /// Map-space bounds of a width x height grid under this transform
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(width as f64, 0.0),
            self.apply(0.0, height as f64),
            self.apply(width as f64, height as f64),
        ];
        let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            bbox.west = bbox.west.min(x);
            bbox.east = bbox.east.max(x);
            bbox.south = bbox.south.min(y);
            bbox.north = bbox.north.max(y);
        }
        bbox
    }
}

/// Coordinate reference system of a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Crs {
    /// Geographic WGS84 (EPSG:4326), map coordinates are lon/lat
    Wgs84,
    /// Any other CRS, carried as WKT for reprojection
    Other { wkt: String },
}

/// Grid geometry shared by every raster: size, transform and CRS
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl RasterGrid {
    pub fn geographic(width: usize, height: usize, transform: GeoTransform) -> Self {
        Self { width, height, transform, crs: Crs::Wgs84 }
    }

    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }
}

/// An opened raster: grid geometry plus the first band's samples
#[derive(Debug, Clone)]
pub struct RasterDataset {
    pub grid: RasterGrid,
    pub data: RasterSamples,
    pub nodata: Option<f64>,
}

impl RasterDataset {
    pub fn new(grid: RasterGrid, data: RasterSamples, nodata: Option<f64>) -> HeightmapResult<Self> {
        if data.dim() != (grid.height, grid.width) {
            return Err(HeightmapError::Processing(format!(
                "Sample array is {:?} but grid is {}x{}",
                data.dim(), grid.height, grid.width
            )));
        }
        Ok(Self { grid, data, nodata })
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Whether a sample is NaN or equal to the band's nodata value
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata.map_or(false, |nd| value as f64 == nd)
    }
}

/// Elevation statistics computed once per run from the clipped elevation raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationStats {
    pub max_elevation: f64,
}

impl ElevationStats {
    /// Global maximum over all valid samples. Fails when nothing is above sea level.
    pub fn from_dataset(dataset: &RasterDataset) -> HeightmapResult<Self> {
        let max = dataset
            .data
            .iter()
            .filter(|v| !dataset.is_nodata(**v))
            .fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));

        let max_elevation = max as f64;
        if !max_elevation.is_finite() || max_elevation <= 0.0 {
            return Err(HeightmapError::DegenerateElevation { max_elevation });
        }

        log::debug!("Maximum elevation in clipped region: {} m", max_elevation);
        Ok(Self { max_elevation })
    }
}

/// Error types for heightmap generation
#[derive(Debug, thiserror::Error)]
pub enum HeightmapError {
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Clipping {dataset} failed: {reason}")]
    ClipFailure { dataset: String, reason: String },

    #[error("Clipped elevation maximum is {max_elevation}, nothing above sea level to normalize against")]
    DegenerateElevation { max_elevation: f64 },

    #[error("Pixel ({x}, {y}) resolves to elevation cell (row {row}, col {col}) outside a {rows}x{cols} raster")]
    CoordinateResolutionFailure {
        x: usize,
        y: usize,
        row: isize,
        col: isize,
        rows: usize,
        cols: usize,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Run was cancelled")]
    Cancelled,
}

/// Result type for heightmap operations
pub type HeightmapResult<T> = Result<T, HeightmapError>;
