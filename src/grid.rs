//! Grid partitioning of the base canvas into overlapping tiles.
//!
//! Each tile has a logical rectangle (its exclusive placement in the output)
//! and a crop rectangle: the logical one grown by the padding on every side and
//! clamped to the canvas. Logical rectangles tile the canvas exactly.

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Rect {
    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Padding actually present on each side of a crop after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Insets {
    /// Left padding.
    pub left: u32,
    /// Top padding.
    pub top: u32,
    /// Right padding.
    pub right: u32,
    /// Bottom padding.
    pub bottom: u32,
}

/// One cell of the partition grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Grid row.
    pub row: u32,
    /// Grid column.
    pub col: u32,
    /// Non-overlapping placement rectangle.
    pub logical: Rect,
    /// Padded, clamped rectangle sent for inference and pasted back.
    pub crop: Rect,
    /// Clamped crop origin minus unclamped crop origin.
    pub paste_offset: (u32, u32),
    /// The single geometric center tile of an odd-by-odd grid.
    pub is_center: bool,
}

impl Tile {
    /// Padding present on each side of the crop.
    #[must_use]
    pub fn insets(&self) -> Insets {
        Insets {
            left: self.logical.x - self.crop.x,
            top: self.logical.y - self.crop.y,
            right: self.crop.right() - self.logical.right(),
            bottom: self.crop.bottom() - self.logical.bottom(),
        }
    }
}

/// Partition a `canvas_w` x `canvas_h` canvas into `rows` x `cols` tiles.
///
/// Canvas dimensions must be exact multiples of the grid, which the canvas
/// upscaler guarantees. Tiles are returned in row-major order.
#[must_use]
pub fn partition(canvas_w: u32, canvas_h: u32, rows: u32, cols: u32, padding: u32) -> Vec<Tile> {
    debug_assert_eq!(canvas_w % cols, 0, "canvas width not a multiple of cols");
    debug_assert_eq!(canvas_h % rows, 0, "canvas height not a multiple of rows");

    let tile_w = canvas_w / cols;
    let tile_h = canvas_h / rows;
    let center = (rows % 2 == 1 && cols % 2 == 1).then_some((rows / 2, cols / 2));

    let mut tiles = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        for col in 0..cols {
            let logical = Rect {
                x: col * tile_w,
                y: row * tile_h,
                width: tile_w,
                height: tile_h,
            };

            // Unclamped origin may be negative; track it in i64.
            let ux = i64::from(logical.x) - i64::from(padding);
            let uy = i64::from(logical.y) - i64::from(padding);
            let x0 = logical.x.saturating_sub(padding);
            let y0 = logical.y.saturating_sub(padding);
            let x1 = logical.right().saturating_add(padding).min(canvas_w);
            let y1 = logical.bottom().saturating_add(padding).min(canvas_h);

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let paste_offset = (
                (i64::from(x0) - ux) as u32,
                (i64::from(y0) - uy) as u32,
            );

            tiles.push(Tile {
                row,
                col,
                logical,
                crop: Rect {
                    x: x0,
                    y: y0,
                    width: x1 - x0,
                    height: y1 - y0,
                },
                paste_offset,
                is_center: center == Some((row, col)),
            });
        }
    }
    tiles
}

/// Smallest source dimension whose tiles are wider than `padding`.
///
/// Below this, a middle tile's crop would run off both canvas edges at once.
#[must_use]
pub fn min_source_dim(scale: u32, cells: u32, padding: u32, trim_unit: u32) -> u32 {
    // tile = dim * scale / cells must exceed padding.
    let min = (u64::from(padding) * u64::from(cells)) / u64::from(scale) + 1;
    let unit = u64::from(trim_unit);
    let rounded = min.div_ceil(unit) * unit;
    u32::try_from(rounded).unwrap_or(u32::MAX)
}
