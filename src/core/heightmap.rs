use crate::core::cancel::CancellationToken;
use crate::core::coordinates::CoordinateMapper;
use crate::core::normalize::ElevationNormalizer;
use crate::types::{HeightmapImage, HeightmapResult, RasterDataset, RasterGrid};
use image::Rgb;

/// Build the base heightmap on `target` (the water mask grid).
///
/// Every target pixel is resolved to its elevation cell through geographic
/// coordinates, since the two grids are clipped independently and need not
/// share resolution or alignment.
pub fn sample_heightmap(
    elevation: &RasterDataset,
    target: &RasterGrid,
    normalizer: &ElevationNormalizer,
    cancel: &CancellationToken,
) -> HeightmapResult<HeightmapImage> {
    let target_mapper = CoordinateMapper::new(target)?;
    let elevation_mapper = CoordinateMapper::new(&elevation.grid)?;

    log::info!(
        "Sampling {}x{} heightmap from {}x{} elevation grid",
        target.width, target.height, elevation.width(), elevation.height()
    );
    cancel.check()?;

    let mut image = HeightmapImage::new(target.width as u32, target.height as u32);
    for y in 0..target.height {
        for x in 0..target.width {
            let (row, col) = elevation_mapper.resolve_from(&target_mapper, x, y)?;
            let raw = elevation.data[[row, col]];
            let intensity = if elevation.is_nodata(raw) {
                0
            } else {
                normalizer.normalize(raw)
            };
            image.put_pixel(x as u32, y as u32, Rgb([intensity; 3]));
        }
    }

    Ok(image)
}
