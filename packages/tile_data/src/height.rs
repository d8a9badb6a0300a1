//! Height field sampling.
//!
//! Heights come as two nested grids per tile: a coarse 129×129 corner-vertex
//! grid ("v9") and a fine 128×128 center-point grid ("v8"). Each unit cell
//! is split into four triangles meeting at the center sample, and a query
//! solves the plane equation of the triangle its fractional position falls
//! in. The file selects one of four sample encodings at build time; the
//! quantized encodings keep their raw samples in memory and reconstruct
//! `raw * multiplier + grid_height` once per query.

use crate::{
    coord::CELL_RES,
    format::{
        self,
        HeightHeader,
    },
};
use std::io::Read;
use anyhow::*;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
};


/// Coarse (corner-vertex) grid side length.
pub const V9_SIZE: usize = 129;
const V9_LEN: usize = V9_SIZE * V9_SIZE;

/// Fine (center-point) grid side length.
pub const V8_SIZE: usize = 128;
const V8_LEN: usize = V8_SIZE * V8_SIZE;

// hole bit templates: one u16 covers an 8×8-cell macro-cell as a 4×4
// sub-grid of 2×2-cell hole flags
const HOLE_H: [u16; 4] = [0x1111, 0x2222, 0x4444, 0x8888];
const HOLE_V: [u16; 4] = [0x000F, 0x00F0, 0x0F00, 0xF000];


/// Height sampling strategy, fixed when the tile is parsed.
#[derive(Debug)]
pub enum HeightMap {
    /// No sample grids; every point reports the tile-wide height.
    Flat,
    /// Full-precision f32 samples.
    Floats {
        v9: Box<[f32]>,
        v8: Box<[f32]>,
    },
    /// 16-bit quantized samples.
    Packed16 {
        v9: Box<[u16]>,
        v8: Box<[u16]>,
        multiplier: f32,
    },
    /// 8-bit quantized samples.
    Packed8 {
        v9: Box<[u8]>,
        v8: Box<[u8]>,
        multiplier: f32,
    },
}

impl HeightMap {
    /// Read the sample grids the section header announces.
    ///
    /// The quantized multiplier is derived here, at load time, and applied
    /// at query time; samples stay raw in memory.
    pub fn read(header: &HeightHeader, read: &mut impl Read) -> Result<Self> {
        if header.flags & format::HEIGHT_FLAG_NO_HEIGHT != 0 {
            return Ok(HeightMap::Flat);
        }

        let span = header.grid_max_height - header.grid_height;
        if header.flags & format::HEIGHT_FLAG_AS_U16 != 0 {
            Ok(HeightMap::Packed16 {
                v9: format::read_u16_grid(read, V9_LEN)?,
                v8: format::read_u16_grid(read, V8_LEN)?,
                multiplier: span / 65535.0,
            })
        } else if header.flags & format::HEIGHT_FLAG_AS_U8 != 0 {
            Ok(HeightMap::Packed8 {
                v9: format::read_u8_grid(read, V9_LEN)?,
                v8: format::read_u8_grid(read, V8_LEN)?,
                multiplier: span / 255.0,
            })
        } else {
            Ok(HeightMap::Floats {
                v9: format::read_f32_grid(read, V9_LEN)?,
                v8: format::read_f32_grid(read, V8_LEN)?,
            })
        }
    }

    /// Interpolated height at fine-grid cell `(x_int, y_int)`, fractional
    /// position `(fx, fy)` within it.
    ///
    /// The four corner samples come from v9, the doubled center sample from
    /// v8. `fx + fy < 1` puts the point in the half nearer corner (0,0),
    /// `fx > fy` picks the triangle within the half; each triangle's plane
    /// `h = a·fx + b·fy + c` is solved in closed form. The quantized
    /// encodings run the same selection over raw samples in integer
    /// arithmetic and scale once at the end.
    pub fn sample(
        &self,
        grid_height: f32,
        x_int: usize,
        y_int: usize,
        fx: f32,
        fy: f32,
    ) -> f32 {
        match self {
            &HeightMap::Flat => grid_height,
            &HeightMap::Floats { ref v9, ref v8 } => {
                let a;
                let b;
                let c;
                if fx + fy < 1.0 {
                    if fx > fy {
                        // triangle against the (0,0)-(1,0) edge
                        let h1 = v9[x_int * V9_SIZE + y_int];
                        let h2 = v9[(x_int + 1) * V9_SIZE + y_int];
                        let h5 = 2.0 * v8[x_int * V8_SIZE + y_int];
                        a = h2 - h1;
                        b = h5 - h1 - h2;
                        c = h1;
                    } else {
                        // triangle against the (0,0)-(0,1) edge
                        let h1 = v9[x_int * V9_SIZE + y_int];
                        let h3 = v9[x_int * V9_SIZE + y_int + 1];
                        let h5 = 2.0 * v8[x_int * V8_SIZE + y_int];
                        a = h5 - h1 - h3;
                        b = h3 - h1;
                        c = h1;
                    }
                } else if fx > fy {
                    // triangle against the (1,0)-(1,1) edge
                    let h2 = v9[(x_int + 1) * V9_SIZE + y_int];
                    let h4 = v9[(x_int + 1) * V9_SIZE + y_int + 1];
                    let h5 = 2.0 * v8[x_int * V8_SIZE + y_int];
                    a = h2 + h4 - h5;
                    b = h4 - h2;
                    c = h5 - h4;
                } else {
                    // triangle against the (0,1)-(1,1) edge
                    let h3 = v9[x_int * V9_SIZE + y_int + 1];
                    let h4 = v9[(x_int + 1) * V9_SIZE + y_int + 1];
                    let h5 = 2.0 * v8[x_int * V8_SIZE + y_int];
                    a = h4 - h3;
                    b = h3 + h4 - h5;
                    c = h5 - h4;
                }
                a * fx + b * fy + c
            }
            &HeightMap::Packed16 { ref v9, ref v8, multiplier } => {
                let (a, b, c) = packed_plane(
                    |i| v9[i] as i32,
                    |i| v8[i] as i32,
                    x_int,
                    y_int,
                    fx,
                    fy,
                );
                (a as f32 * fx + b as f32 * fy + c as f32) * multiplier + grid_height
            }
            &HeightMap::Packed8 { ref v9, ref v8, multiplier } => {
                let (a, b, c) = packed_plane(
                    |i| v9[i] as i32,
                    |i| v8[i] as i32,
                    x_int,
                    y_int,
                    fx,
                    fy,
                );
                (a as f32 * fx + b as f32 * fy + c as f32) * multiplier + grid_height
            }
        }
    }
}

// triangle selection and plane coefficients over raw quantized samples, in
// integer arithmetic
fn packed_plane(
    v9: impl Fn(usize) -> i32,
    v8: impl Fn(usize) -> i32,
    x_int: usize,
    y_int: usize,
    fx: f32,
    fy: f32,
) -> (i32, i32, i32) {
    if fx + fy < 1.0 {
        if fx > fy {
            let h1 = v9(x_int * V9_SIZE + y_int);
            let h2 = v9((x_int + 1) * V9_SIZE + y_int);
            let h5 = 2 * v8(x_int * V8_SIZE + y_int);
            (h2 - h1, h5 - h1 - h2, h1)
        } else {
            let h1 = v9(x_int * V9_SIZE + y_int);
            let h3 = v9(x_int * V9_SIZE + y_int + 1);
            let h5 = 2 * v8(x_int * V8_SIZE + y_int);
            (h5 - h1 - h3, h3 - h1, h1)
        }
    } else if fx > fy {
        let h2 = v9((x_int + 1) * V9_SIZE + y_int);
        let h4 = v9((x_int + 1) * V9_SIZE + y_int + 1);
        let h5 = 2 * v8(x_int * V8_SIZE + y_int);
        (h2 + h4 - h5, h4 - h2, h5 - h4)
    } else {
        let h3 = v9(x_int * V9_SIZE + y_int + 1);
        let h4 = v9((x_int + 1) * V9_SIZE + y_int + 1);
        let h5 = 2 * v8(x_int * V8_SIZE + y_int);
        (h4 - h3, h3 + h4 - h5, h5 - h4)
    }
}


/// Per-tile hole mask: a 16×16 grid of macro-cell masks, each flagging
/// which 2×2 groups of fine cells have no walkable surface.
#[derive(Debug)]
pub struct HoleMask(Box<[[u16; CELL_RES]; CELL_RES]>);

impl HoleMask {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let mut masks = Box::new([[0u16; CELL_RES]; CELL_RES]);
        for row in masks.iter_mut() {
            read.read_u16_into::<LittleEndian>(row)?;
        }
        Ok(HoleMask(masks))
    }

    /// Whether every mask is zero, i.e. the tile has no holes at all.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|row| row.iter().all(|&mask| mask == 0))
    }

    /// Whether fine-grid cell `(row, col)` falls in a hole.
    pub fn is_hole(&self, row: usize, col: usize) -> bool {
        let cell_row = row / 8;
        let cell_col = col / 8;
        let hole_row = row % 8 / 2;
        let hole_col = col % 8 / 2;

        let hole = self.0[cell_row][cell_col];

        hole & HOLE_H[hole_col] & HOLE_V[hole_row] != 0
    }
}

#[cfg(test)]
pub(crate) fn hole_mask_from(masks: [[u16; CELL_RES]; CELL_RES]) -> HoleMask {
    HoleMask(Box::new(masks))
}
