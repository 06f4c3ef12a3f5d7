//! I/O modules for clipping source rasters, reading them and encoding images

pub mod clip;
pub mod encode;
pub mod raster;

pub use clip::{clipper_for, ClippedRaster, CommandClipper, GdalClipper, RasterClipper};
pub use encode::save_image;
pub use raster::RasterReader;
