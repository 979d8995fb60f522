//! Image decoding: fetched file → displayable [`ImageHandle`].
//!
//! ## Why scale metadata instead of pixels?
//!
//! The display width only changes how tall the image appears, which decides
//! how many bands it is cut into. Pixels are resampled lazily per band by
//! [`crate::pipeline::encode`] so a tall image is never resized as a whole.

use crate::error::TaskError;
use crate::pipeline::fetch::FetchedImage;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A decoded image plus the width it is displayed at.
///
/// Cloning is cheap: pixels are shared.
#[derive(Clone)]
pub struct ImageHandle {
    image: Arc<DynamicImage>,
    display_width: u32,
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.pixel_size();
        f.debug_struct("ImageHandle")
            .field("pixel_size", &(w, h))
            .field("display_size", &self.display_size())
            .finish()
    }
}

impl ImageHandle {
    /// Wrap an already decoded image, displayed at its own width.
    pub fn from_image(image: DynamicImage) -> Self {
        let display_width = image.width().max(1);
        Self {
            image: Arc::new(image),
            display_width,
        }
    }

    /// Decode the file at `path`, guessing the format from its contents.
    pub fn decode(path: &Path) -> Result<Self, TaskError> {
        let decode_err = |reason: String| TaskError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let image = ImageReader::open(path)
            .map_err(|e| decode_err(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| decode_err(e.to_string()))?
            .decode()
            .map_err(|e| decode_err(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(decode_err("image has zero size".into()));
        }
        Ok(Self::from_image(image))
    }

    /// Decode and cap the display width at `max_width`.
    pub fn decode_for_display(path: &Path, max_width: u32) -> Result<Self, TaskError> {
        let mut handle = Self::decode(path)?;
        let (w, h) = handle.pixel_size();
        handle.set_display_width(w.min(max_width));
        debug!(
            "Decoded {} → {}x{} px, displayed at {:?}",
            path.display(),
            w,
            h,
            handle.display_size()
        );
        Ok(handle)
    }

    /// Intrinsic pixel size.
    pub fn pixel_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn set_display_width(&mut self, width: u32) {
        self.display_width = width.max(1);
    }

    /// Size on screen: display width and the proportionally scaled height.
    pub fn display_size(&self) -> (u32, u32) {
        let (w, h) = self.pixel_size();
        if w == self.display_width {
            return (w, h);
        }
        let scaled = (h as f64 * self.display_width as f64 / w as f64).round() as u32;
        (self.display_width, scaled.max(1))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Decode a fetched image off the async executor.
///
/// The fetched handle (and any temporary download) lives until decoding
/// finishes, then the file is removed.
pub async fn load(fetched: FetchedImage, max_width: u32) -> Result<ImageHandle, TaskError> {
    let path = fetched.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let handle = ImageHandle::decode_for_display(fetched.path(), max_width);
        drop(fetched);
        handle
    })
    .await
    .map_err(|e| TaskError::Decode {
        path,
        reason: format!("decode task panicked: {e}"),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn display_size_scales_height() {
        let mut handle = ImageHandle::from_image(solid(1400, 300));
        assert_eq!(handle.display_size(), (1400, 300));
        handle.set_display_width(700);
        assert_eq!(handle.display_size(), (700, 150));
        assert_eq!(handle.pixel_size(), (1400, 300));
    }

    #[test]
    fn decode_for_display_only_shrinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        solid(100, 40).save(&path).unwrap();
        let handle = ImageHandle::decode_for_display(&path, 700).unwrap();
        assert_eq!(handle.display_size(), (100, 40));

        let handle = ImageHandle::decode_for_display(&path, 50).unwrap();
        assert_eq!(handle.display_size(), (50, 20));
    }

    #[test]
    fn decode_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not an image").unwrap();
        let err = ImageHandle::decode(&path).unwrap_err();
        assert!(matches!(err, TaskError::Decode { .. }));
    }

    #[test]
    fn decode_missing_file_is_an_error() {
        let err = ImageHandle::decode(Path::new("/no/such/file.png")).unwrap_err();
        assert!(matches!(err, TaskError::Decode { .. }));
    }

    #[tokio::test]
    async fn load_runs_off_the_executor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        solid(20, 60).save(&path).unwrap();
        let handle = load(FetchedImage::Local(path), 700).await.unwrap();
        assert_eq!(handle.pixel_size(), (20, 60));
    }
}
