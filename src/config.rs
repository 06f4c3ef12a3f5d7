//! Run configuration: dataset locations, clip backend and numeric policies

use crate::types::{HeightmapError, HeightmapResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations of the three global source rasters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPaths {
    /// Global elevation grid (ETOPO1)
    pub elevation: PathBuf,
    /// Global land/water mask, 0 marks water
    pub water_mask: PathBuf,
    /// Global river presence grid, non-zero marks a river cell
    pub rivers: PathBuf,
}

impl DatasetPaths {
    /// All three datasets under one directory, using the stock file names
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            elevation: dir.join("etopo1.tif"),
            water_mask: dir.join("gshhs_land_water_mask_3km_i.tif"),
            rivers: dir.join("rivers.tif"),
        }
    }
}

impl Default for DatasetPaths {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("world-heightmap");
        Self::in_dir(base)
    }
}

/// How source rasters are clipped to the bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipBackend {
    /// Window read through GDAL in-process
    Gdal,
    /// External `rio clip`-compatible command
    Command {
        program: String,
        #[serde(default)]
        extra_args: Vec<String>,
    },
}

impl Default for ClipBackend {
    fn default() -> Self {
        ClipBackend::Gdal
    }
}

/// Conversion of the scaled elevation to an 8-bit intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityRounding {
    /// Drop the fractional part (matches the legacy tool output)
    Truncate,
    /// Round half away from zero
    Nearest,
}

/// What the normal map holds in its outermost ring of pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalBorder {
    /// Left at the initial fill (0, 0, 0)
    Black,
    /// Neighbours outside the image are clamped to the nearest edge pixel
    ClampEdge,
}

/// Full configuration for a heightmap run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightmapConfig {
    pub datasets: DatasetPaths,
    pub clip: ClipBackend,
    /// Block magnification applied before resizing onto the river grid
    pub upscale_factor: u32,
    /// Gradient multiplier for normal map derivation
    pub normal_strength: f32,
    /// Water mask value that marks water
    pub water_sentinel: f32,
    pub rounding: IntensityRounding,
    pub normal_border: NormalBorder,
}

impl Default for HeightmapConfig {
    fn default() -> Self {
        Self {
            datasets: DatasetPaths::default(),
            clip: ClipBackend::default(),
            upscale_factor: 2,
            normal_strength: 5.0,
            water_sentinel: 0.0,
            rounding: IntensityRounding::Truncate,
            normal_border: NormalBorder::Black,
        }
    }
}

impl HeightmapConfig {
    /// Load configuration from a JSON file; absent fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> HeightmapResult<Self> {
        log::info!("Loading configuration from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> HeightmapResult<Self> {
        let config: HeightmapConfig = serde_json::from_str(text)
            .map_err(|e| HeightmapError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HeightmapResult<()> {
        if self.upscale_factor == 0 {
            return Err(HeightmapError::Config("upscale_factor must be at least 1".to_string()));
        }
        if !self.normal_strength.is_finite() || self.normal_strength <= 0.0 {
            return Err(HeightmapError::Config(format!(
                "normal_strength must be positive, got {}", self.normal_strength
            )));
        }
        if let ClipBackend::Command { program, .. } = &self.clip {
            if program.trim().is_empty() {
                return Err(HeightmapError::Config("clip command program is empty".to_string()));
            }
        }
        Ok(())
    }
}
