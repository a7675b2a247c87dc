//! Context reference: a bounded, lossy view of the whole source image.
//!
//! The context travels with every tile so the model can see what subject and
//! lighting a crop belongs to without paying for the full-resolution image.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::codec::{self, EncodedImage};
use crate::error::Result;

/// Dimensions that fit `(width, height)` inside `max_dim` on the long edge.
///
/// Images already within the cap are returned unchanged. Aspect ratio is
/// preserved with floor rounding, never dropping below one pixel.
#[must_use]
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }
    let max = f64::from(max_dim);
    let ratio = (max / f64::from(width)).min(max / f64::from(height));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = |v: u32| ((f64::from(v) * ratio).floor() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Build the encoded context image for a source.
///
/// # Errors
///
/// Returns [`Error::Encode`](crate::Error::Encode) if JPEG encoding fails.
pub fn build_context(source: &RgbaImage, max_dim: u32, quality: u8) -> Result<EncodedImage> {
    let (w, h) = fit_within(source.width(), source.height(), max_dim);
    if (w, h) == source.dimensions() {
        return codec::encode_jpeg(source, quality);
    }
    let resized = imageops::resize(source, w, h, FilterType::Triangle);
    tracing::debug!(
        from_width = source.width(),
        from_height = source.height(),
        width = w,
        height = h,
        "context image downscaled"
    );
    codec::encode_jpeg(&resized, quality)
}
