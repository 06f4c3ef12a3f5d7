use crate::core::cancel::CancellationToken;
use crate::types::{HeightmapError, HeightmapImage, HeightmapResult, RasterDataset};
use image::Rgb;

/// Force every water pixel of the heightmap to intensity 0 (sea level).
///
/// The heightmap must sit on the water mask grid: pixel (x, y) is compared
/// with mask sample [y, x]. Returns the number of flattened pixels.
pub fn apply_water_mask(
    heightmap: &mut HeightmapImage,
    water_mask: &RasterDataset,
    water_sentinel: f32,
    cancel: &CancellationToken,
) -> HeightmapResult<usize> {
    let (width, height) = heightmap.dimensions();
    if (width as usize, height as usize) != (water_mask.width(), water_mask.height()) {
        return Err(HeightmapError::Processing(format!(
            "Heightmap is {}x{} but water mask is {}x{}",
            width, height, water_mask.width(), water_mask.height()
        )));
    }
    cancel.check()?;

    let mut flattened = 0;
    for (x, y, pixel) in heightmap.enumerate_pixels_mut() {
        if water_mask.data[[y as usize, x as usize]] == water_sentinel {
            *pixel = Rgb([0, 0, 0]);
            flattened += 1;
        }
    }

    log::info!(
        "Flattened {} water pixels ({:.1}%)",
        flattened,
        100.0 * flattened as f64 / (width as f64 * height as f64)
    );
    Ok(flattened)
}
