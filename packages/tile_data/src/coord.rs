//! World/tile coordinate transforms shared by every terrain query.
//!
//! World coordinates are centered: the origin sits at the corner of tile
//! (32, 32), and tile indices grow as world coordinates decrease. Every
//! query goes through the same affine family at one of two resolutions:
//! the fine 128×128 height grid or the coarse 16×16 cell grid.

use vek::*;


/// Tiles per region axis. A region is a `TILE_COUNT`×`TILE_COUNT` grid.
pub const TILE_COUNT: usize = 64;

/// Tile index at the world origin.
pub const TILE_MID: f32 = 32.0;

/// Side length of one tile in world units.
pub const TILE_SIZE: f32 = 533.333_3;

/// Fine sampling resolution per tile axis (height cells).
pub const HEIGHT_RES: usize = 128;

/// Coarse sampling resolution per tile axis (area / liquid-type cells).
pub const CELL_RES: usize = 16;

/// Threshold below which a height answer means "no surface here".
pub const INVALID_HEIGHT: f32 = -100_000.0;

/// Sentinel returned by tile queries that found no usable data.
pub const INVALID_HEIGHT_VALUE: f32 = -200_000.0;

/// Initializer for combined-source height searches, below every real answer.
pub const LOWEST_HEIGHT: f32 = -300_000.0;


/// Tile index containing a world position. Unclamped; callers bounds-check
/// against `TILE_COUNT`.
pub fn world_to_tile(x: f32, y: f32) -> Vec2<i32> {
    Vec2 {
        x: (TILE_MID - x / TILE_SIZE) as i32,
        y: (TILE_MID - y / TILE_SIZE) as i32,
    }
}

/// Decompose one world axis into a fine-grid cell index and the fractional
/// position within that cell.
///
/// The index is wrapped into the tile; the fraction is in `[0, 1)` for any
/// point inside the region.
pub fn fine_coord(c: f32) -> (usize, f32) {
    let v = HEIGHT_RES as f32 * (TILE_MID - c / TILE_SIZE);
    let i = v as i32;
    let frac = v - i as f32;
    ((i & (HEIGHT_RES as i32 - 1)) as usize, frac)
}

/// Coarse-grid cell index for one world axis, wrapped into the tile.
pub fn coarse_coord(c: f32) -> usize {
    let v = CELL_RES as f32 * (TILE_MID - c / TILE_SIZE);
    (v as i32 & (CELL_RES as i32 - 1)) as usize
}
