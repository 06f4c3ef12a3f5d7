use crate::types::{HeightmapError, HeightmapResult};
use image::{ImageFormat, RgbImage};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Encode an RGB image to `destination`, format chosen by file extension.
///
/// The image is written to a sibling temporary file and renamed into place,
/// so a failed encode never leaves a partial file at the destination.
pub fn save_image<P: AsRef<Path>>(image: &RgbImage, destination: P) -> HeightmapResult<()> {
    let destination = destination.as_ref();
    log::info!(
        "Encoding {}x{} image to {}",
        image.width(), image.height(), destination.display()
    );

    let format = ImageFormat::from_path(destination).map_err(|e| {
        HeightmapError::Encoding(format!("unsupported output {}: {}", destination.display(), e))
    })?;

    let parent = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let temp = tempfile::Builder::new()
        .prefix(".heightmap-")
        .tempfile_in(parent)
        .map_err(|e| {
            HeightmapError::Encoding(format!("cannot write into {}: {}", parent.display(), e))
        })?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        image
            .write_to(&mut writer, format)
            .map_err(|e| HeightmapError::Encoding(format!("{:?} encoding failed: {}", format, e)))?;
        writer.flush()?;
    }

    temp.persist(destination).map_err(|e| {
        HeightmapError::Encoding(format!("cannot move image to {}: {}", destination.display(), e.error))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_save_bmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bmp");
        let img = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));

        save_image(&img, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (4, 3));
        assert_eq!(loaded.get_pixel(2, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.bmp");
        let img = RgbImage::new(2, 2);

        let result = save_image(&img, &path);
        assert!(matches!(result, Err(HeightmapError::Encoding(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.heightmap");
        let result = save_image(&RgbImage::new(2, 2), &path);
        assert!(matches!(result, Err(HeightmapError::Encoding(_))));
        assert!(!path.exists());
    }
}
