//! Per-tile terrain data.
//!
//! One world region is a dense 64×64 grid of square tiles, each backed by a
//! compact binary file. This package owns the file format and everything that
//! can be answered from a single parsed tile: ground height, area ids, hole
//! masking, liquid type and surface level. It does no caching, no locking,
//! and no logging — the `terrain` package layers all of that on top.

pub mod coord;
pub mod format;
pub mod height;
pub mod liquid;
pub mod tile;

pub use self::{
    coord::*,
    format::*,
    height::{
        HeightMap,
        HoleMask,
    },
    liquid::{
        LiquidData,
        LiquidMap,
        LiquidStatus,
        ResolvedLiquid,
    },
    tile::TerrainTile,
};
