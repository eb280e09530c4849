//! Image Loader
//!
//! Decodes wallpaper files into RGB buffers.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use tracing::debug;

/// Source of decoded images, keyed by path
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<RgbImage>;
}

/// Loads images from disk with the `image` crate (PNG and JPEG)
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path) -> Result<RgbImage> {
        debug!("Loading image {:?}", path);
        let image = image::open(path)
            .with_context(|| format!("Failed to decode image {:?}", path))?
            .to_rgb8();
        debug!("Decoded {:?}: {}x{}", path, image.width(), image.height());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wall.png");
        RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let image = FileImageLoader.load(&path).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [1, 2, 3]);
    }

    #[test]
    fn test_missing_or_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileImageLoader.load(&dir.path().join("missing.png")).is_err());

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"not an image").unwrap();
        assert!(FileImageLoader.load(&garbage).is_err());
    }
}
