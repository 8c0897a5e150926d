//! Image preparation: rendered PNG → size-capped base64 payload.
//!
//! Vision APIs reject oversized uploads, and a 300-DPI schematic page can
//! easily exceed the limit. Pages above `max_image_bytes` are downscaled by
//! `sqrt(max / size)` on each axis (area, and so roughly PNG size, shrinks by
//! `max / size`) with a Lanczos filter that keeps small print legible.

use crate::document::Page;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use std::io::Cursor;
use tracing::debug;

/// A page image ready to embed in a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 (standard alphabet, padded) image bytes.
    pub base64: String,
    pub mime_type: String,
}

impl EncodedImage {
    /// `data:` URL for OpenAI-style `image_url` content parts.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Downscale `page` if needed and base64-encode it.
pub fn prepare_image(page: &Page, max_bytes: usize) -> Result<EncodedImage, image::ImageError> {
    let png = shrink_to_fit(&page.png, max_bytes)?;
    let b64 = STANDARD.encode(&png);
    debug!(
        "Page {}: {} PNG bytes → {} base64 bytes",
        page.number(),
        png.len(),
        b64.len()
    );
    Ok(EncodedImage {
        base64: b64,
        mime_type: "image/png".to_string(),
    })
}

/// Return `png` unchanged when it fits, otherwise a resized re-encode.
fn shrink_to_fit(png: &[u8], max_bytes: usize) -> Result<Vec<u8>, image::ImageError> {
    if png.len() <= max_bytes {
        return Ok(png.to_vec());
    }

    let img = image::load_from_memory(png)?;
    let scale = (max_bytes as f64 / png.len() as f64).sqrt();
    let width = ((img.width() as f64 * scale) as u32).max(1);
    let height = ((img.height() as f64 * scale) as u32).max(1);
    debug!(
        "Downscaling {}x{} → {}x{} ({} bytes over {} limit)",
        img.width(),
        img.height(),
        width,
        height,
        png.len(),
        max_bytes
    );

    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    let mut buf = Vec::new();
    resized.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
