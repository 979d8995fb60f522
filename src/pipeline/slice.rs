//! Geometric slicing of an image into equal horizontal bands.
//!
//! The row count is `min(max_rows, display_height / band_height)`, never less
//! than one. Each crop spans the full width and `1.0001 / rows` of the height;
//! the slack keeps rounding from trimming the bottom edge of the last band.

use crate::pipeline::decode::ImageHandle;
use serde::Serialize;

/// Slack applied to the terminal bound of every axis.
pub const TERMINAL_SLACK: f64 = 1.0001;

/// A normalised rectangle of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Crop {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Crop {
    /// Pixel rectangle `(x, y, width, height)` inside a `width × height` image.
    ///
    /// Bounds are clamped to the image and the result is at least 1×1.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let px = |v: f64, max: u32| ((v.clamp(0.0, 1.0) * max as f64).round() as u32).min(max);
        let x = px(self.x0, width).min(width.saturating_sub(1));
        let y = px(self.y0, height).min(height.saturating_sub(1));
        let w = px(self.x1, width).saturating_sub(x).max(1);
        let h = px(self.y1, height).saturating_sub(y).max(1);
        (x, y, w, h)
    }
}

/// Number of bands for an image of `image_height` pixels.
pub fn row_count(image_height: u32, max_rows: usize, band_height: u32) -> usize {
    let fit = (image_height / band_height.max(1)) as usize;
    max_rows.min(fit).max(1)
}

/// Lazy top-to-bottom sequence of `(Crop, ImageHandle)`.
///
/// Cloning restarts nothing and shares nothing: each clone iterates on its own.
#[derive(Debug, Clone)]
pub struct Slices {
    image: ImageHandle,
    rows: usize,
    step: f64,
    next: usize,
}

impl Slices {
    /// Total number of crops this sequence yields.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl Iterator for Slices {
    type Item = (Crop, ImageHandle);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.rows {
            return None;
        }
        let y0 = self.next as f64 * self.step;
        if y0 >= 1.0 {
            return None;
        }
        let y1 = (self.next + 1) as f64 * self.step;
        self.next += 1;
        let crop = Crop {
            x0: 0.0,
            y0,
            x1: TERMINAL_SLACK,
            y1,
        };
        Some((crop, self.image.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows - self.next;
        // With enough rows the slack pushes the last starts past 1.0 and
        // `next` stops early, so only the upper bound is exact then.
        if (self.rows as f64 - 1.0) * self.step < 1.0 {
            (left, Some(left))
        } else {
            (0, Some(left))
        }
    }
}

/// Slice `image` into at most `max_rows` bands of roughly `band_height` pixels.
pub fn slice(image: &ImageHandle, max_rows: usize, band_height: u32) -> Slices {
    let (_, display_height) = image.display_size();
    let rows = row_count(display_height, max_rows, band_height);
    Slices {
        image: image.clone(),
        rows,
        step: TERMINAL_SLACK / rows as f64,
        next: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn handle(w: u32, h: u32) -> ImageHandle {
        ImageHandle::from_image(DynamicImage::ImageRgba8(RgbaImage::new(w, h)))
    }

    #[test]
    fn row_count_is_capped_and_clamped() {
        assert_eq!(row_count(40, 3, 20), 2);
        assert_eq!(row_count(400, 3, 20), 3);
        assert_eq!(row_count(10, 3, 20), 1);
        assert_eq!(row_count(400, 0, 20), 1);
        assert_eq!(row_count(400, 5, 0), 5);
    }

    #[test]
    fn forty_pixels_with_twenty_pixel_bands_gives_two_crops() {
        let crops: Vec<Crop> = slice(&handle(30, 40), 3, 20).map(|(c, _)| c).collect();
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[0].y0, 0.0);
        assert_eq!(crops[0].y1, crops[1].y0);
        assert!(crops[1].y1 >= 1.0);
    }

    #[test]
    fn crops_are_contiguous_and_cover_the_image() {
        for rows in 1..=64usize {
            let crops: Vec<Crop> = slice(&handle(10, 10_000), rows, 1).map(|(c, _)| c).collect();
            assert_eq!(crops.len(), rows);
            assert_eq!(crops[0].y0, 0.0);
            for pair in crops.windows(2) {
                assert_eq!(pair[0].y1, pair[1].y0);
                assert!(pair[0].y0 < pair[0].y1);
            }
            let last = crops.last().unwrap();
            assert!(last.y1 >= 1.0 && last.y1 <= TERMINAL_SLACK + 1e-12);
            assert!(crops.iter().all(|c| c.x0 == 0.0 && c.x1 == TERMINAL_SLACK));
        }
    }

    #[test]
    fn short_image_still_yields_one_crop() {
        let crops: Vec<_> = slice(&handle(10, 5), 10, 40).collect();
        assert_eq!(crops.len(), 1);
    }

    #[test]
    fn slicing_uses_display_height() {
        let mut h = handle(1400, 800);
        h.set_display_width(700);
        assert_eq!(slice(&h, 100, 40).rows(), 10);
    }

    #[test]
    fn sequence_is_restartable() {
        let s = slice(&handle(10, 100), 4, 20);
        let first: Vec<Crop> = s.clone().map(|(c, _)| c).collect();
        let second: Vec<Crop> = s.map(|(c, _)| c).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn pixel_rect_clamps_slack() {
        let crop = Crop {
            x0: 0.0,
            y0: 0.5,
            x1: TERMINAL_SLACK,
            y1: TERMINAL_SLACK,
        };
        assert_eq!(crop.to_pixel_rect(100, 40), (0, 20, 100, 20));
    }

    #[test]
    fn size_hint_never_overstates_what_is_yielded() {
        let slices = slice(&handle(1, 30_000), 20_000, 1);
        assert_eq!(slices.rows(), 20_000);
        let (lower, upper) = slices.size_hint();
        let yielded = slices.count();
        assert!(lower <= yielded, "{lower} > {yielded}");
        assert!(upper.is_some_and(|u| u >= yielded));
        assert!(yielded < 20_000);

        let small = slice(&handle(30, 40), 3, 20);
        assert_eq!(small.size_hint(), (2, Some(2)));
    }
}
