//! Fixed 16x16 tile index for partial-screen invalidation.
//!
//! The screen is split into a 16x16 grid (tile size = ceil(dimension / 16)
//! per axis). Each tile keeps the indices of the widgets overlapping it,
//! capped at [`TILE_CAP`] entries; overflow entries are dropped and such a
//! widget is simply not rendered from that tile. That is a documented
//! capacity limit of the design, not a hidden bug.
//!
//! The index is rebuilt wholesale on every committed snapshot. It is never
//! updated incrementally within a snapshot's lifetime.

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Tiles per axis.
pub const GRID: usize = 16;

/// Maximum widget indices per tile.
pub const TILE_CAP: usize = 32;

/// Inclusive tile range covering a widget's bounding box, clamped to the
/// grid in both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileSpan {
    pub tx1: u8,
    pub tx2: u8,
    pub ty1: u8,
    pub ty2: u8,
}

impl TileSpan {
    /// 16-bit mask with one bit set per spanned tile column.
    #[inline]
    pub fn col_mask(&self) -> u16 {
        ((2u32 << self.tx2) - (1u32 << self.tx1)) as u16
    }
}

#[inline]
fn tile_coord(v: i32, tile: i32) -> u8 {
    (v / tile).clamp(0, GRID as i32 - 1) as u8
}

/// The spatial index: screen geometry plus one widget list per tile.
pub struct TileGrid {
    screen_w: u32,
    screen_h: u32,
    tile_w: i32,
    tile_h: i32,
    tiles: Box<[heapless::Vec<u16, TILE_CAP>]>,
}

impl TileGrid {
    pub fn new(screen_w: u32, screen_h: u32) -> Self {
        assert!(screen_w > 0 && screen_h > 0, "degenerate screen size");
        let g = GRID as u32;
        Self {
            screen_w,
            screen_h,
            tile_w: screen_w.div_ceil(g) as i32,
            tile_h: screen_h.div_ceil(g) as i32,
            tiles: (0..GRID * GRID).map(|_| heapless::Vec::new()).collect(),
        }
    }

    #[inline]
    pub fn screen(&self) -> (u32, u32) {
        (self.screen_w, self.screen_h)
    }

    #[inline]
    pub fn tile_size(&self) -> (i32, i32) {
        (self.tile_w, self.tile_h)
    }

    /// Tile range covering the box `(x, y, w, h)`. The right/bottom edge
    /// uses `x + w` directly, so a box ending exactly on a tile boundary
    /// also claims the next tile; clipping makes the extra tile harmless
    /// and a repaint of it always redraws the box's edge pixels.
    pub fn span(&self, x: i32, y: i32, w: u16, h: u16) -> TileSpan {
        TileSpan {
            tx1: tile_coord(x, self.tile_w),
            tx2: tile_coord(x + i32::from(w), self.tile_w),
            ty1: tile_coord(y, self.tile_h),
            ty2: tile_coord(y + i32::from(h), self.tile_h),
        }
    }

    /// Drop every widget list. Called before an index rebuild.
    pub fn clear(&mut self) {
        for t in self.tiles.iter_mut() {
            t.clear();
        }
    }

    /// Append `index` to every tile in `span`, subject to [`TILE_CAP`].
    pub fn insert(&mut self, span: &TileSpan, index: u16) {
        for ty in span.ty1..=span.ty2 {
            for tx in span.tx1..=span.tx2 {
                // Push errors mean the tile is full; the entry is dropped.
                let _ = self.tiles[usize::from(ty) * GRID + usize::from(tx)].push(index);
            }
        }
    }

    /// Widget indices overlapping tile `(tx, ty)`.
    #[inline]
    pub fn tile(&self, tx: usize, ty: usize) -> &[u16] {
        &self.tiles[ty * GRID + tx]
    }

    /// Pixel rectangle of the dirty run covering tile columns `c1..=c2` in
    /// `row`, clamped to the screen. Zero-sized at the ragged bottom edge
    /// of small screens where a whole tile row lies past the last pixel.
    pub fn run_rect(&self, row: usize, c1: usize, c2: usize) -> Rectangle {
        let x1 = (c1 as i32 * self.tile_w).min(self.screen_w as i32);
        let x2 = ((c2 as i32 + 1) * self.tile_w).min(self.screen_w as i32);
        let y1 = (row as i32 * self.tile_h).min(self.screen_h as i32);
        let y2 = ((row as i32 + 1) * self.tile_h).min(self.screen_h as i32);
        Rectangle::new(Point::new(x1, y1), Size::new((x2 - x1) as u32, (y2 - y1) as u32))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
