//! Image encoding: rendered raster → opaque RGB PNG bytes.
//!
//! PNG keeps text edges lossless. pdfium hands back RGBA; pages are
//! rendered onto a white background, so the alpha channel carries no
//! information and is dropped before encoding.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// MIME type of every stored page image.
pub const PAGE_IMAGE_MIME: &str = "image/png";

/// Encode a rasterised page as an RGB PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        rgb.width(),
        rgb.height(),
        buf.len()
    );
    Ok(buf)
}

/// Storage object name for a page image.
pub fn page_file_name(page_number: u32) -> String {
    format!("page-{page_number}.png")
}
