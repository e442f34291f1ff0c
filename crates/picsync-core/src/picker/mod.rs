//! Random image picker
//!
//! Serves one randomly chosen catalog entry as JPEG bytes. Every failure
//! along the way (empty catalog, catalog error, missing or undecodable file,
//! encoding error) is logged and reported as `None`; the caller only ever
//! learns "no image available".
//!
//! Stale records are left alone: a file that disappeared after it was
//! indexed keeps failing until the catalog is cleared.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::traits::CatalogStore;

/// Picks a random catalog entry and loads it from disk
#[derive(Clone)]
pub struct RandomImagePicker {
    store: Arc<dyn CatalogStore>,
}

impl RandomImagePicker {
    /// Create a picker reading from `store`
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Decode a random catalog image
    ///
    /// # Returns
    ///
    /// - `Some(DynamicImage)`: The decoded raster
    /// - `None`: The catalog is empty, or the picked file could not be read
    ///   or decoded (no retry with another record)
    pub async fn random_image(&self) -> Option<DynamicImage> {
        let record = match self.store.pick_random().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("No image found in catalog");
                return None;
            }
            Err(e) => {
                error!("Failed to pick a random image from the catalog: {}", e);
                return None;
            }
        };

        debug!("Picked {}", record);
        match load_raster(&record.image_file_path).await {
            Ok(image) => Some(image),
            Err(e) => {
                error!(
                    "Image could not be read from disk: {}, {}",
                    record.image_file_path.display(),
                    e
                );
                None
            }
        }
    }

    /// A random catalog image encoded as JPEG
    ///
    /// # Returns
    ///
    /// - `Some(bytes)`: JPEG bytes
    /// - `None`: No image available (see [`RandomImagePicker::random_image`]),
    ///   or encoding failed
    pub async fn random_image_bytes(&self) -> Option<Vec<u8>> {
        let image = self.random_image().await?;

        match tokio::task::spawn_blocking(move || encode_jpeg(&image)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("JPEG encoding task failed: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for RandomImagePicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomImagePicker").finish_non_exhaustive()
    }
}

/// Encode a raster as JPEG
///
/// Rasters that are not 8-bit gray or RGB (alpha channels, 16-bit or float
/// samples) are converted to 8-bit RGB first. Failures are logged and
/// reported as `None`.
pub fn encode_jpeg(image: &DynamicImage) -> Option<Vec<u8>> {
    match try_encode_jpeg(image) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Error while encoding image as JPEG: {}", e);
            None
        }
    }
}

fn try_encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => {
            image.write_to(&mut buffer, ImageFormat::Jpeg)?;
        }
        other => {
            DynamicImage::ImageRgb8(other.to_rgb8()).write_to(&mut buffer, ImageFormat::Jpeg)?;
        }
    }
    Ok(buffer.into_inner())
}

/// Read and decode one image file
async fn load_raster(path: &Path) -> Result<DynamicImage> {
    let bytes = tokio::fs::read(path).await?;
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await??;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn is_jpeg(bytes: &[u8]) -> bool {
        bytes.starts_with(&[0xFF, 0xD8]) && bytes.ends_with(&[0xFF, 0xD9])
    }

    #[test]
    fn test_encode_rgb() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])));
        let bytes = encode_jpeg(&image).expect("rgb encodes");
        assert!(is_jpeg(&bytes));

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_encode_flattens_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 6, Rgba([0, 0, 255, 128])));
        let bytes = encode_jpeg(&image).expect("rgba is flattened and encoded");
        assert!(is_jpeg(&bytes));
    }

    #[tokio::test]
    async fn test_load_raster_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.jpg");
        assert!(load_raster(&missing).await.is_err());

        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"definitely not a jpeg").unwrap();
        assert!(matches!(
            load_raster(&garbage).await,
            Err(crate::Error::Image(_))
        ));
    }
}
