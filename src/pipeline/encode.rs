//! Band encoding: one crop of an [`ImageHandle`] → base64 PNG data URI.
//!
//! PNG keeps text in screenshots and diagrams crisp; the data URI lets an
//! exported preview carry its bands inline without sidecar files.

use crate::pipeline::decode::ImageHandle;
use crate::pipeline::slice::Crop;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Cut `crop` out of `image` and scale it to the display width.
pub fn render_band(image: &ImageHandle, crop: &Crop) -> DynamicImage {
    let (w, h) = image.pixel_size();
    let (x, y, cw, ch) = crop.to_pixel_rect(w, h);
    let band = image.image().crop_imm(x, y, cw, ch);

    let (display_w, display_h) = image.display_size();
    if display_w == w {
        return band;
    }
    let scaled_h = ((ch as f64 * display_h as f64 / h as f64).round() as u32).max(1);
    band.resize_exact(display_w, scaled_h, FilterType::Triangle)
}

/// Encode a rendered band as PNG bytes.
pub fn encode_png(band: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    band.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode one band as a `data:image/png;base64,…` URI.
pub fn encode_band(image: &ImageHandle, crop: &Crop) -> Result<String, image::ImageError> {
    let band = render_band(image, crop);
    let png = encode_png(&band)?;
    let b64 = STANDARD.encode(&png);
    debug!(
        "Encoded {}x{} band → {} bytes base64",
        band.width(),
        band.height(),
        b64.len()
    );
    Ok(format!("data:image/png;base64,{b64}"))
}
