use crate::config::IntensityRounding;
use crate::types::{ElevationStats, HeightmapError, HeightmapResult};

/// Converts raw elevation samples to 8-bit grayscale intensity
#[derive(Debug, Clone, Copy)]
pub struct ElevationNormalizer {
    /// Elevations below this are raised to it before scaling
    floor: f64,
    max_elevation: f64,
    rounding: IntensityRounding,
}

impl ElevationNormalizer {
    /// `min_elevation` of `None` leaves elevations unclamped.
    pub fn new(
        stats: &ElevationStats,
        min_elevation: Option<i32>,
        rounding: IntensityRounding,
    ) -> HeightmapResult<Self> {
        if !stats.max_elevation.is_finite() || stats.max_elevation <= 0.0 {
            return Err(HeightmapError::DegenerateElevation {
                max_elevation: stats.max_elevation,
            });
        }

        Ok(Self {
            floor: min_elevation.map_or(f64::NEG_INFINITY, f64::from),
            max_elevation: stats.max_elevation,
            rounding,
        })
    }

    pub fn max_elevation(&self) -> f64 {
        self.max_elevation
    }

    /// Intensity of a raw sample: `255 * max(trunc(raw), floor) / max_elevation`,
    /// clamped to [0, 255]. NaN samples map to 0.
    pub fn normalize(&self, raw_elevation: f32) -> u8 {
        if raw_elevation.is_nan() {
            return 0;
        }
        // Raw samples are whole metres before the floor applies
        let elevation = (raw_elevation as f64).trunc().max(self.floor);
        self.scale(elevation)
    }

    /// Intensity of an elevation already resolved to metres (no truncation or floor).
    pub fn scale(&self, elevation: f64) -> u8 {
        let scaled = 255.0 * elevation / self.max_elevation;
        let value = match self.rounding {
            IntensityRounding::Truncate => scaled.trunc(),
            IntensityRounding::Nearest => scaled.round(),
        };
        value.clamp(0.0, 255.0) as u8
    }
}
