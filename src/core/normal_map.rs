use crate::config::NormalBorder;
use crate::core::cancel::CancellationToken;
use crate::types::{HeightmapImage, HeightmapResult, NormalMapImage};
use image::{imageops, GrayImage, Rgb};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Normal map derivation parameters
#[derive(Debug, Clone)]
pub struct NormalMapParams {
    /// Multiplier applied to the height differences
    pub strength: f32,
    pub border: NormalBorder,
}

impl Default for NormalMapParams {
    fn default() -> Self {
        Self {
            strength: 5.0,
            border: NormalBorder::Black,
        }
    }
}

/// Unit surface normal at (x, y) from central differences of the four
/// axis neighbours. Heights are scaled to [0, 1]; neighbours outside the
/// image are clamped to the edge.
pub fn surface_normal(heights: &GrayImage, x: u32, y: u32, strength: f32) -> [f32; 3] {
    let (width, height) = heights.dimensions();
    let sample = |sx: i64, sy: i64| -> f32 {
        let cx = sx.clamp(0, width as i64 - 1) as u32;
        let cy = sy.clamp(0, height as i64 - 1) as u32;
        heights.get_pixel(cx, cy).0[0] as f32 / 255.0
    };

    let (x, y) = (x as i64, y as i64);
    let left = sample(x - 1, y);
    let right = sample(x + 1, y);
    let up = sample(x, y - 1);
    let down = sample(x, y + 1);

    let nx = (left - right) * strength;
    let ny = (down - up) * strength;
    let nz = 1.0f32;

    let length = (nx * nx + ny * ny + nz * nz).sqrt();
    [nx / length, ny / length, nz / length]
}

/// Encode a unit normal component from [-1, 1] into [0, 255]
pub fn encode_component(component: f32) -> u8 {
    ((component * 0.5 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8
}

fn is_border(x: u32, y: u32, width: u32, height: u32) -> bool {
    x == 0 || y == 0 || x + 1 >= width || y + 1 >= height
}

fn encode_row(heights: &GrayImage, y: u32, params: &NormalMapParams) -> Vec<[u8; 3]> {
    let (width, height) = heights.dimensions();
    (0..width)
        .map(|x| {
            if params.border == NormalBorder::Black && is_border(x, y, width, height) {
                return [0, 0, 0];
            }
            let n = surface_normal(heights, x, y, params.strength);
            [encode_component(n[0]), encode_component(n[1]), encode_component(n[2])]
        })
        .collect()
}

/// Derive a tangent-space normal map from a heightmap.
///
/// The heightmap is reduced to luma first. With `NormalBorder::Black` the
/// one-pixel frame keeps its initial black fill.
pub fn to_normal_map(
    heightmap: &HeightmapImage,
    params: &NormalMapParams,
    cancel: &CancellationToken,
) -> HeightmapResult<NormalMapImage> {
    let heights = imageops::grayscale(heightmap);
    let (width, height) = heights.dimensions();
    log::info!(
        "Deriving {}x{} normal map (strength {}, border {:?})",
        width, height, params.strength, params.border
    );
    cancel.check()?;

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<[u8; 3]>> = (0..height)
        .into_par_iter()
        .map(|y| encode_row(&heights, y, params))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<[u8; 3]>> = (0..height)
        .map(|y| encode_row(&heights, y, params))
        .collect();

    let mut normal_map = NormalMapImage::new(width, height);
    for (y, row) in rows.into_iter().enumerate() {
        for (x, rgb) in row.into_iter().enumerate() {
            normal_map.put_pixel(x as u32, y as u32, Rgb(rgb));
        }
    }

    Ok(normal_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{Luma, RgbImage};

    fn ramp(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 37 + y * 11) % 256) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_flat_surface_points_up() {
        let flat = RgbImage::from_pixel(5, 5, Rgb([120, 120, 120]));
        let normal_map = to_normal_map(&flat, &NormalMapParams::default(), &CancellationToken::new()).unwrap();
        assert_eq!(normal_map.get_pixel(2, 2), &Rgb([128, 128, 255]));
    }

    #[test]
    fn test_black_border_is_left_unprocessed() {
        let normal_map = to_normal_map(&ramp(6, 4), &NormalMapParams::default(), &CancellationToken::new()).unwrap();
        for (x, y, pixel) in normal_map.enumerate_pixels() {
            if x == 0 || y == 0 || x == 5 || y == 3 {
                assert_eq!(pixel, &Rgb([0, 0, 0]));
            }
        }
    }

    #[test]
    fn test_clamped_border_is_filled() {
        let params = NormalMapParams { strength: 5.0, border: NormalBorder::ClampEdge };
        let flat = RgbImage::from_pixel(4, 4, Rgb([60, 60, 60]));
        let normal_map = to_normal_map(&flat, &params, &CancellationToken::new()).unwrap();
        for pixel in normal_map.pixels() {
            assert_eq!(pixel, &Rgb([128, 128, 255]));
        }
    }

    #[test]
    fn test_slope_direction() {
        // Height rises to the right: the normal leans towards -x
        let heights = GrayImage::from_fn(3, 3, |x, _| Luma([(x * 100) as u8]));
        let n = surface_normal(&heights, 1, 1, 5.0);
        assert!(n[0] < 0.0);
        assert_relative_eq!(n[1], 0.0);
        assert!(n[2] > 0.0);
    }

    #[test]
    fn test_interior_normals_are_unit_length() {
        let image = ramp(16, 9);
        let heights = imageops::grayscale(&image);
        for y in 1..8 {
            for x in 1..15 {
                let n = surface_normal(&heights, x, y, 5.0);
                let length = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
                assert_relative_eq!(length, 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_rows_match_per_pixel_normals() {
        let image = ramp(23, 17);
        let heights = imageops::grayscale(&image);
        let params = NormalMapParams { strength: 3.0, border: NormalBorder::ClampEdge };
        let normal_map = to_normal_map(&image, &params, &CancellationToken::new()).unwrap();

        for (x, y, pixel) in normal_map.enumerate_pixels() {
            let n = surface_normal(&heights, x, y, 3.0);
            let expected = [encode_component(n[0]), encode_component(n[1]), encode_component(n[2])];
            assert_eq!(pixel.0, expected, "pixel ({}, {})", x, y);
        }
    }

    #[test]
    fn test_component_encoding_range() {
        assert_eq!(encode_component(-1.0), 0);
        assert_eq!(encode_component(0.0), 128);
        assert_eq!(encode_component(1.0), 255);
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = to_normal_map(&ramp(3, 3), &NormalMapParams::default(), &cancel);
        assert!(result.is_err());
    }
}
