//! Base canvas: the trimmed, smoothly upscaled source.
//!
//! The canvas is both the structural baseline the tiles are cut from and the
//! fallback for any tile the service fails to enhance.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::{Error, Result};

/// Largest canvas, in pixels, the pipeline will allocate.
pub const MAX_CANVAS_PIXELS: u64 = 1 << 30;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Source trim unit along one axis.
///
/// A source dimension that is a multiple of this unit upscales to a canvas
/// dimension divisible by both `scale` and `cells`. Equals `scale` whenever
/// `cells` divides `scale` (the 3x, 3x3 default).
#[must_use]
pub fn trim_unit(scale: u32, cells: u32) -> u32 {
    let g = gcd(scale, cells);
    let need = cells / g;
    scale / gcd(scale, need) * need
}

/// Trim `dim` down to a multiple of `unit`.
#[must_use]
pub fn trim(dim: u32, unit: u32) -> u32 {
    dim - dim % unit
}

/// Final canvas dimensions for a source of `(width, height)`.
#[must_use]
pub fn canvas_dimensions(width: u32, height: u32, scale: u32, rows: u32, cols: u32) -> (u64, u64) {
    let w = trim(width, trim_unit(scale, cols));
    let h = trim(height, trim_unit(scale, rows));
    (u64::from(w) * u64::from(scale), u64::from(h) * u64::from(scale))
}

/// Canvas dimensions, rejecting anything above [`MAX_CANVAS_PIXELS`].
///
/// # Errors
///
/// Returns [`Error::CanvasTooLarge`] when the canvas is over the ceiling or
/// does not fit in `u32` dimensions.
pub fn checked_canvas_dimensions(
    width: u32,
    height: u32,
    scale: u32,
    rows: u32,
    cols: u32,
) -> Result<(u32, u32)> {
    let (cw, ch) = canvas_dimensions(width, height, scale, rows, cols);
    let too_large = || Error::CanvasTooLarge {
        width: cw,
        height: ch,
    };
    if cw.saturating_mul(ch) > MAX_CANVAS_PIXELS {
        return Err(too_large());
    }
    let w = u32::try_from(cw).map_err(|_| too_large())?;
    let h = u32::try_from(ch).map_err(|_| too_large())?;
    Ok((w, h))
}

/// Trim and upscale `source` into the base canvas.
///
/// # Errors
///
/// Returns [`Error::CanvasTooLarge`] as [`checked_canvas_dimensions`] does.
pub fn upscale_canvas(source: &RgbaImage, scale: u32, rows: u32, cols: u32) -> Result<RgbaImage> {
    let (target_w, target_h) =
        checked_canvas_dimensions(source.width(), source.height(), scale, rows, cols)?;

    let w = target_w / scale;
    let h = target_h / scale;
    let trimmed = imageops::crop_imm(source, 0, 0, w, h).to_image();

    Ok(imageops::resize(&trimmed, target_w, target_h, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_unit_equals_scale_for_default_grid() {
        assert_eq!(trim_unit(3, 3), 3);
        assert_eq!(trim_unit(3, 1), 3);
        assert_eq!(trim_unit(4, 2), 4);
    }

    #[test]
    fn trim_unit_covers_grid_when_scale_does_not() {
        // 2x on a 3-column grid: source must be a multiple of 6.
        assert_eq!(trim_unit(2, 3), 6);
        assert_eq!((6 * 2) % 3, 0);
    }

    #[test]
    fn canvas_dimensions_follow_trim_then_scale() {
        for (w, h) in [(300, 300), (301, 302), (1000, 777), (5, 3)] {
            let (cw, ch) = canvas_dimensions(w, h, 3, 3, 3);
            assert_eq!(cw, u64::from((w - w % 3) * 3));
            assert_eq!(ch, u64::from((h - h % 3) * 3));
        }
    }

    #[test]
    fn upscale_produces_exact_multiple() {
        let src = RgbaImage::from_pixel(101, 50, image::Rgba([1, 2, 3, 255]));
        let canvas = upscale_canvas(&src, 3, 3, 3).unwrap();
        assert_eq!(canvas.dimensions(), (297, 144));
        assert_eq!(canvas.width() % 3, 0);
        assert_eq!(canvas.height() % 3, 0);
        assert_eq!(canvas.get_pixel(150, 70), &image::Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn oversized_canvas_is_rejected() {
        let err = checked_canvas_dimensions(40_000, 40_000, 3, 3, 3).unwrap_err();
        assert!(matches!(err, Error::CanvasTooLarge { .. }));
        assert_eq!(
            checked_canvas_dimensions(300, 300, 3, 3, 3).unwrap(),
            (900, 900)
        );
    }
}
