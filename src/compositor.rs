//! Stitching processed tiles back onto the base canvas.

use std::collections::HashMap;

use image::RgbaImage;

use crate::blending::{self, BlendMask};
use crate::grid::Insets;
use crate::inference::ProcessedTile;

/// Composite all tiles onto `canvas`, which the compositor now owns.
///
/// Perimeter tiles go first in grid order, then the center tile, so the
/// center is never faded by a neighbor painted on top of it. Failed tiles
/// take part like any other, carrying the base upscale for their crop.
/// Masks are built once per distinct crop geometry.
#[must_use]
pub fn composite(mut canvas: RgbaImage, tiles: &[ProcessedTile]) -> RgbaImage {
    let mut masks: HashMap<(u32, u32, Insets), BlendMask> = HashMap::new();

    let perimeter = tiles.iter().filter(|t| !t.tile.is_center);
    let center = tiles.iter().filter(|t| t.tile.is_center);

    for processed in perimeter.chain(center) {
        let tile = &processed.tile;
        debug_assert_eq!(
            processed.pixels.dimensions(),
            (tile.crop.width, tile.crop.height),
            "tile pixels must match crop size"
        );

        let insets = tile.insets();
        let mask = masks
            .entry((tile.crop.width, tile.crop.height, insets))
            .or_insert_with(|| BlendMask::new(tile.crop.width, tile.crop.height, insets));

        blending::blend_over(&mut canvas, &processed.pixels, mask, tile.crop.x, tile.crop.y);
    }

    tracing::debug!(
        tiles = tiles.len(),
        masks = masks.len(),
        width = canvas.width(),
        height = canvas.height(),
        "composite complete"
    );
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    use crate::grid::partition;
    use crate::inference::crop_tile;

    #[allow(clippy::cast_possible_truncation)]
    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]))
    }

    fn color_for(row: u32, col: u32) -> Rgba<u8> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (row * 3 + col) as u8;
        Rgba([v * 20, 255 - v * 20, v, 255])
    }

    #[test]
    fn fallback_tiles_leave_canvas_identical() {
        let base = gradient(900, 900);
        let tiles: Vec<_> = partition(900, 900, 3, 3, 160)
            .into_iter()
            .map(|tile| ProcessedTile {
                pixels: crop_tile(&base, &tile),
                tile,
                success: false,
            })
            .collect();

        let out = composite(base.clone(), &tiles);
        assert_eq!(out, base);
    }

    #[test]
    fn tile_cores_come_from_their_results() {
        let (size, padding) = (90u32, 10u32);
        let base = gradient(size, size);
        let tiles: Vec<_> = partition(size, size, 3, 3, padding)
            .into_iter()
            .map(|tile| ProcessedTile {
                pixels: RgbaImage::from_pixel(
                    tile.crop.width,
                    tile.crop.height,
                    color_for(tile.row, tile.col),
                ),
                tile,
                success: true,
            })
            .collect();

        let out = composite(base, &tiles);

        for t in &tiles {
            let l = t.tile.logical;
            // Skip the band a neighbor's fade-in overlaps.
            let inner = |lo: u32, hi: u32, at_lo_edge: bool, at_hi_edge: bool| {
                let a = if at_lo_edge { lo } else { lo + padding };
                let b = if at_hi_edge { hi } else { hi - padding };
                a..b
            };
            let xs = inner(l.x, l.right(), l.x == 0, l.right() == size);
            let ys = inner(l.y, l.bottom(), l.y == 0, l.bottom() == size);
            for y in ys {
                for x in xs.clone() {
                    assert_eq!(
                        out.get_pixel(x, y),
                        &color_for(t.tile.row, t.tile.col),
                        "tile ({}, {}) at ({x}, {y})",
                        t.tile.row,
                        t.tile.col
                    );
                }
            }
        }
    }

    #[test]
    fn center_tile_is_pasted_last() {
        let base = gradient(90, 90);
        let tiles: Vec<_> = partition(90, 90, 3, 3, 10)
            .into_iter()
            .map(|tile| ProcessedTile {
                pixels: RgbaImage::from_pixel(
                    tile.crop.width,
                    tile.crop.height,
                    color_for(tile.row, tile.col),
                ),
                tile,
                success: true,
            })
            .collect();

        let out = composite(base, &tiles);
        let center = color_for(1, 1);
        // The whole center logical rect is opaque center-tile content.
        for y in 30..60 {
            for x in 30..60 {
                assert_eq!(out.get_pixel(x, y), &center, "({x}, {y})");
            }
        }
    }

    #[test]
    fn output_keeps_canvas_dimensions() {
        let base = gradient(60, 30);
        let tiles: Vec<_> = partition(60, 30, 3, 3, 4)
            .into_iter()
            .map(|tile| ProcessedTile {
                pixels: crop_tile(&base, &tile),
                tile,
                success: false,
            })
            .collect();
        assert_eq!(composite(base, &tiles).dimensions(), (60, 30));
    }
}
