//! world-heightmap: clip global elevation rasters into game-ready heightmaps
//!
//! Takes a geographic bounding box, clips the elevation, land/water and river
//! rasters to it, and renders a grayscale heightmap (optionally with water
//! flattened to sea level and rivers burned in) or a tangent-space normal map.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::{ClipBackend, DatasetPaths, HeightmapConfig, IntensityRounding, NormalBorder};
pub use core::{
    CancellationToken, HeightmapPipeline, HeightmapRequest, OutputKind, RenderOptions,
    RenderReport, SurfaceMode,
};
pub use types::{
    BoundingBox, ElevationStats, GeoTransform, HeightmapError, HeightmapImage, HeightmapResult,
    NormalMapImage, RasterDataset,
};

pub use io::{ClippedRaster, GdalClipper, CommandClipper, RasterClipper, RasterReader};
