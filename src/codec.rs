//! Encoding at the inference service boundary.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};

use crate::error::{Error, Result};

/// MIME type of every image this crate sends to the service.
pub const JPEG_MIME: &str = "image/jpeg";

/// An image in transmission form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Compressed bytes.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub mime_type: &'static str,
    /// Pixel width before encoding.
    pub width: u32,
    /// Pixel height before encoding.
    pub height: u32,
}

/// Encode RGBA pixels as a lossy JPEG at the given quality (1-100).
///
/// Alpha is dropped; the service only sees color.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the encoder rejects the buffer.
pub fn encode_jpeg(pixels: &RgbaImage, quality: u8) -> Result<EncodedImage> {
    let rgb = DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(encoder)
        .map_err(Error::Encode)?;

    Ok(EncodedImage {
        bytes,
        mime_type: JPEG_MIME,
        width: pixels.width(),
        height: pixels.height(),
    })
}
