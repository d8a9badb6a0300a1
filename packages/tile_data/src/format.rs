//! On-disk tile file layout.
//!
//! A tile file is a fixed root header followed by up to four independently
//! seekable sections — area, height, liquid, holes — each located by an
//! `(offset, size)` pair in the root header, offset 0 meaning absent. All
//! integers are little-endian and all floats are IEEE-754 32-bit. The area,
//! height and liquid sections open with a fourcc that must match before any
//! field in the section is trusted; the holes section is a raw mask grid
//! with no fourcc.

use std::io::Read;
use anyhow::*;
use byteorder::{
    LittleEndian,
    ReadBytesExt,
};


/// Root header magic.
pub const TILE_MAGIC: u32 = u32::from_le_bytes(*b"MAPS");

/// Format version tag the loader accepts.
pub const TILE_VERSION_MAGIC: u32 = u32::from_le_bytes(*b"s1.4");

/// Area section fourcc.
pub const AREA_MAGIC: u32 = u32::from_le_bytes(*b"AREA");

/// Height section fourcc.
pub const HEIGHT_MAGIC: u32 = u32::from_le_bytes(*b"MHGT");

/// Liquid section fourcc.
pub const LIQUID_MAGIC: u32 = u32::from_le_bytes(*b"MLIQ");


/// Area section carries no cell grid, only the tile-wide area id.
pub const AREA_FLAG_NO_AREA: u16 = 0x0001;

/// Height section carries no sample grids; the whole tile is flat.
pub const HEIGHT_FLAG_NO_HEIGHT: u32 = 0x0001;
/// Height samples are 16-bit quantized.
pub const HEIGHT_FLAG_AS_U16: u32 = 0x0002;
/// Height samples are 8-bit quantized.
pub const HEIGHT_FLAG_AS_U8: u32 = 0x0004;

/// Liquid section carries no per-cell entry/flags grids.
pub const LIQUID_FLAG_NO_TYPE: u8 = 0x01;
/// Liquid section carries no surface-level window.
pub const LIQUID_FLAG_NO_HEIGHT: u8 = 0x02;

// per-cell liquid type flag bits, also used as query masks
pub const LIQUID_TYPE_MAGMA: u8 = 0x01;
pub const LIQUID_TYPE_OCEAN: u8 = 0x02;
pub const LIQUID_TYPE_SLIME: u8 = 0x04;
pub const LIQUID_TYPE_WATER: u8 = 0x08;
pub const LIQUID_TYPE_DEEP_WATER: u8 = 0x10;

/// Every swimmable/standable liquid kind.
pub const LIQUID_ALL_TYPES: u8 =
    LIQUID_TYPE_MAGMA | LIQUID_TYPE_OCEAN | LIQUID_TYPE_SLIME | LIQUID_TYPE_WATER;


/// Root header: format and version tags plus the section directory.
#[derive(Debug, Copy, Clone)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub area_offset: u32,
    pub area_size: u32,
    pub height_offset: u32,
    pub height_size: u32,
    pub liquid_offset: u32,
    pub liquid_size: u32,
    pub holes_offset: u32,
    pub holes_size: u32,
}

impl FileHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(FileHeader {
            magic: read.read_u32::<LittleEndian>()?,
            version: read.read_u32::<LittleEndian>()?,
            area_offset: read.read_u32::<LittleEndian>()?,
            area_size: read.read_u32::<LittleEndian>()?,
            height_offset: read.read_u32::<LittleEndian>()?,
            height_size: read.read_u32::<LittleEndian>()?,
            liquid_offset: read.read_u32::<LittleEndian>()?,
            liquid_size: read.read_u32::<LittleEndian>()?,
            holes_offset: read.read_u32::<LittleEndian>()?,
            holes_size: read.read_u32::<LittleEndian>()?,
        })
    }
}

/// Area section header.
#[derive(Debug, Copy, Clone)]
pub struct AreaHeader {
    pub fourcc: u32,
    pub flags: u16,
    pub grid_area: u16,
}

impl AreaHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(AreaHeader {
            fourcc: read.read_u32::<LittleEndian>()?,
            flags: read.read_u16::<LittleEndian>()?,
            grid_area: read.read_u16::<LittleEndian>()?,
        })
    }
}

/// Height section header.
///
/// `grid_height` doubles as the flat height and the quantized reconstruction
/// base; `grid_max_height` exists only to derive the quantized multiplier.
#[derive(Debug, Copy, Clone)]
pub struct HeightHeader {
    pub fourcc: u32,
    pub flags: u32,
    pub grid_height: f32,
    pub grid_max_height: f32,
}

impl HeightHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(HeightHeader {
            fourcc: read.read_u32::<LittleEndian>()?,
            flags: read.read_u32::<LittleEndian>()?,
            grid_height: read.read_f32::<LittleEndian>()?,
            grid_max_height: read.read_f32::<LittleEndian>()?,
        })
    }
}

/// Liquid section header.
///
/// `global_entry`/`global_flags`/`level` are the tile-wide fallbacks used
/// when the corresponding grids are absent; the offset/width/height rect
/// bounds the surface-level window in fine-grid cells.
#[derive(Debug, Copy, Clone)]
pub struct LiquidHeader {
    pub fourcc: u32,
    pub flags: u8,
    pub global_flags: u8,
    pub global_entry: u16,
    pub offset_x: u8,
    pub offset_y: u8,
    pub width: u8,
    pub height: u8,
    pub level: f32,
}

impl LiquidHeader {
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Ok(LiquidHeader {
            fourcc: read.read_u32::<LittleEndian>()?,
            flags: read.read_u8()?,
            global_flags: read.read_u8()?,
            global_entry: read.read_u16::<LittleEndian>()?,
            offset_x: read.read_u8()?,
            offset_y: read.read_u8()?,
            width: read.read_u8()?,
            height: read.read_u8()?,
            level: read.read_f32::<LittleEndian>()?,
        })
    }
}


/// Read a little-endian u16 grid of `len` samples.
pub(crate) fn read_u16_grid(read: &mut impl Read, len: usize) -> Result<Box<[u16]>> {
    let mut grid = vec![0u16; len];
    read.read_u16_into::<LittleEndian>(&mut grid)?;
    Ok(grid.into_boxed_slice())
}

/// Read a little-endian f32 grid of `len` samples.
pub(crate) fn read_f32_grid(read: &mut impl Read, len: usize) -> Result<Box<[f32]>> {
    let mut grid = vec![0f32; len];
    read.read_f32_into::<LittleEndian>(&mut grid)?;
    Ok(grid.into_boxed_slice())
}

/// Read a u8 grid of `len` samples.
pub(crate) fn read_u8_grid(read: &mut impl Read, len: usize) -> Result<Box<[u8]>> {
    let mut grid = vec![0u8; len];
    read.read_exact(&mut grid)?;
    Ok(grid.into_boxed_slice())
}
