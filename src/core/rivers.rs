use crate::core::cancel::CancellationToken;
use crate::io::encode::save_image;
use crate::types::{HeightmapError, HeightmapImage, HeightmapResult, RasterDataset};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::path::Path;

/// Block-upscale an image: each source pixel becomes a `factor` x `factor`
/// block of the same colour.
pub fn upscale_image(image: &RgbImage, factor: u32) -> HeightmapResult<RgbImage> {
    if factor == 0 {
        return Err(HeightmapError::Processing("Upscale factor must be at least 1".to_string()));
    }
    let (width, height) = image.dimensions();
    let out_width = width
        .checked_mul(factor)
        .ok_or_else(|| HeightmapError::Processing(format!("{}x upscale of width {} overflows", factor, width)))?;
    let out_height = height
        .checked_mul(factor)
        .ok_or_else(|| HeightmapError::Processing(format!("{}x upscale of height {} overflows", factor, height)))?;

    Ok(RgbImage::from_fn(out_width, out_height, |x, y| {
        *image.get_pixel(x / factor, y / factor)
    }))
}

/// Block-upscale an image file into `destination`
pub fn upscale_file<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    destination: Q,
    factor: u32,
) -> HeightmapResult<()> {
    log::info!("Upscaling {} by {}x", source.as_ref().display(), factor);
    let image = image::open(source.as_ref())?.to_rgb8();
    let upscaled = upscale_image(&image, factor)?;
    save_image(&upscaled, destination)
}

/// Burn rivers into the heightmap at the river raster's resolution.
///
/// The heightmap is block-upscaled by `factor`, resized with a cubic filter
/// to exactly the river grid size, and every non-zero river cell is set to
/// black. The returned image replaces the input as the run's output.
pub fn overlay_rivers(
    heightmap: &HeightmapImage,
    rivers: &RasterDataset,
    factor: u32,
    cancel: &CancellationToken,
) -> HeightmapResult<HeightmapImage> {
    cancel.check()?;
    let upscaled = upscale_image(heightmap, factor)?;

    let (river_width, river_height) = (rivers.width() as u32, rivers.height() as u32);
    log::info!(
        "Overlaying rivers: {}x{} heightmap -> {}x{} river grid",
        heightmap.width(), heightmap.height(), river_width, river_height
    );
    let mut output = imageops::resize(&upscaled, river_width, river_height, FilterType::CatmullRom);

    cancel.check()?;
    let mut burned = 0usize;
    for ((row, col), &value) in rivers.data.indexed_iter() {
        if value != 0.0 && !rivers.is_nodata(value) {
            output.put_pixel(col as u32, row as u32, Rgb([0, 0, 0]));
            burned += 1;
        }
    }

    log::debug!("Burned {} river cells", burned);
    Ok(output)
}
