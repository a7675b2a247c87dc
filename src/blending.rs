//! Blend masks and alpha compositing for tile stitching.
//!
//! A tile is pasted over the canvas with Porter-Duff source-over on straight
//! alpha, the mask scaling the tile's coverage:
//!
//! ```text
//! a_top = mask * a_tile
//! a_out = a_top + a_canvas * (1 - a_top)
//! c_out = (c_tile * a_top + c_canvas * a_canvas * (1 - a_top)) / a_out
//! ```
//!
//! A tile pixel equal to the canvas pixel underneath is skipped, so fallback
//! tiles leave the base canvas bit-exact.

use image::RgbaImage;

use crate::grid::Insets;

/// Geometry-only alpha mask for one tile crop.
///
/// Opaque in the interior; on each padded side the mask ramps linearly from
/// `0.0` at the outermost pixel to `1.0` at the padding depth. Sides without
/// padding (canvas borders) do not fade.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendMask {
    width: u32,
    height: u32,
    alpha: Vec<f32>,
}

/// Linear ramp for one axis: `d / pad` within `pad` of either end, else 1.
#[allow(clippy::cast_precision_loss)]
fn axis_ramp(len: u32, lead: u32, trail: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let mut a = 1.0_f32;
            if lead > 0 && i < lead {
                a *= i as f32 / lead as f32;
            }
            let from_end = len - 1 - i;
            if trail > 0 && from_end < trail {
                a *= from_end as f32 / trail as f32;
            }
            a
        })
        .collect()
}

impl BlendMask {
    /// Build a mask for a `width` x `height` crop with the given padding per side.
    #[must_use]
    pub fn new(width: u32, height: u32, insets: Insets) -> Self {
        let ramp_x = axis_ramp(width, insets.left, insets.right);
        let ramp_y = axis_ramp(height, insets.top, insets.bottom);

        let mut alpha = Vec::with_capacity((width as usize) * (height as usize));
        for ay in &ramp_y {
            alpha.extend(ramp_x.iter().map(|ax| ax * ay));
        }

        Self {
            width,
            height,
            alpha,
        }
    }

    /// Mask with the same padding `p` on all four sides.
    #[must_use]
    pub fn uniform(width: u32, height: u32, p: u32) -> Self {
        Self::new(
            width,
            height,
            Insets {
                left: p,
                top: p,
                right: p,
                bottom: p,
            },
        )
    }

    /// Mask width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Alpha at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the mask.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        assert!(x < self.width && y < self.height, "mask index out of range");
        self.alpha[(y * self.width + x) as usize]
    }
}

/// Composite `tile` onto `canvas` at `(pos_x, pos_y)`, weighted by `mask`.
///
/// Operates in-place. The region is clipped to the canvas bounds; pixels with
/// zero coverage, or identical to the canvas, are left untouched.
pub fn blend_over(
    canvas: &mut RgbaImage,
    tile: &RgbaImage,
    mask: &BlendMask,
    pos_x: u32,
    pos_y: u32,
) {
    debug_assert_eq!(tile.dimensions(), (mask.width, mask.height));

    let x2 = (pos_x + tile.width()).min(canvas.width());
    let y2 = (pos_y + tile.height()).min(canvas.height());
    if pos_x >= x2 || pos_y >= y2 {
        return;
    }

    for dy in 0..(y2 - pos_y) {
        for dx in 0..(x2 - pos_x) {
            let src = tile.get_pixel(dx, dy);
            let dst = canvas.get_pixel_mut(pos_x + dx, pos_y + dy);
            if *src == *dst {
                continue;
            }

            let top_a = mask.get(dx, dy) * f32::from(src[3]) / 255.0;
            if top_a <= 0.0 {
                continue;
            }
            let under_a = f32::from(dst[3]) / 255.0 * (1.0 - top_a);
            let out_a = top_a + under_a;

            for (d, s) in dst.0[..3].iter_mut().zip(&src.0[..3]) {
                let c = (f32::from(*s) * top_a + f32::from(*d) * under_a) / out_a;
                *d = to_channel(c);
            }
            dst[3] = to_channel(out_a * 255.0);
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn interior_is_fully_opaque() {
        let p = 16;
        let mask = BlendMask::uniform(100, 80, p);
        for y in p..80 - p {
            for x in p..100 - p {
                assert!((mask.get(x, y) - 1.0).abs() < f32::EPSILON, "({x},{y})");
            }
        }
    }

    #[test]
    fn outer_edge_is_transparent_and_ramp_is_monotonic() {
        let p = 10;
        let mask = BlendMask::uniform(60, 60, p);
        let mid = 30;
        assert!(mask.get(0, mid).abs() < f32::EPSILON);
        assert!(mask.get(59, mid).abs() < f32::EPSILON);
        assert!(mask.get(mid, 0).abs() < f32::EPSILON);
        assert!(mask.get(mid, 59).abs() < f32::EPSILON);

        for x in 1..=p {
            assert!(mask.get(x, mid) > mask.get(x - 1, mid));
            assert!(mask.get(59 - x, mid) > mask.get(60 - x, mid));
        }
        assert!((mask.get(5, mid) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unpadded_sides_do_not_fade() {
        let mask = BlendMask::new(
            50,
            50,
            Insets {
                left: 0,
                top: 0,
                right: 10,
                bottom: 10,
            },
        );
        assert!((mask.get(0, 0) - 1.0).abs() < f32::EPSILON);
        assert!((mask.get(39, 39) - 1.0).abs() < f32::EPSILON);
        assert!(mask.get(49, 20).abs() < f32::EPSILON);
    }

    #[test]
    fn blending_identical_pixels_is_identity() {
        #[allow(clippy::cast_possible_truncation)]
        let base = RgbaImage::from_fn(40, 40, |x, y| Rgba([(x * 6) as u8, (y * 6) as u8, 77, 255]));
        let mut canvas = base.clone();
        let tile = image::imageops::crop_imm(&base, 5, 5, 30, 30).to_image();
        let mask = BlendMask::uniform(30, 30, 8);

        blend_over(&mut canvas, &tile, &mask, 5, 5);
        assert_eq!(canvas, base);
    }

    #[test]
    fn full_weight_replaces_and_half_weight_mixes() {
        let mut canvas = RgbaImage::from_pixel(20, 1, Rgba([0, 0, 0, 255]));
        let tile = RgbaImage::from_pixel(20, 1, Rgba([200, 100, 50, 255]));
        let mask = BlendMask::new(
            20,
            1,
            Insets {
                left: 10,
                ..Insets::default()
            },
        );

        blend_over(&mut canvas, &tile, &mask, 0, 0);
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(5, 0), &Rgba([100, 50, 25, 255]));
        assert_eq!(canvas.get_pixel(15, 0), &Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn opaque_tile_over_transparent_canvas_keeps_tile_color() {
        let mut canvas = RgbaImage::from_pixel(20, 1, Rgba([0, 0, 0, 0]));
        let tile = RgbaImage::from_pixel(20, 1, Rgba([200, 200, 200, 255]));
        let mask = BlendMask::new(
            20,
            1,
            Insets {
                left: 10,
                ..Insets::default()
            },
        );

        blend_over(&mut canvas, &tile, &mask, 0, 0);
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.get_pixel(5, 0), &Rgba([200, 200, 200, 128]));
        assert_eq!(canvas.get_pixel(15, 0), &Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn translucent_tile_never_lowers_opaque_canvas_alpha() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let tile = RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 128]));
        let mask = BlendMask::new(4, 4, Insets::default());

        blend_over(&mut canvas, &tile, &mask, 0, 0);
        assert_eq!(canvas.get_pixel(2, 2), &Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn fully_transparent_tile_changes_nothing() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let tile = RgbaImage::from_pixel(4, 4, Rgba([250, 250, 250, 0]));
        let mask = BlendMask::new(4, 4, Insets::default());

        blend_over(&mut canvas, &tile, &mask, 0, 0);
        assert!(canvas.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn paste_is_clipped_to_canvas() {
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let tile = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        let mask = BlendMask::new(8, 8, Insets::default());

        blend_over(&mut canvas, &tile, &mask, 6, 6);
        assert_eq!(canvas.get_pixel(9, 9), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
    }
}
