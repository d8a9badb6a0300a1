//! Interfaces to the external collision-mesh and navmesh systems.
//!
//! The terrain stack never walks detailed 3-D geometry itself; it asks a
//! `CollisionProvider` for heights, area info and liquid surfaces derived
//! from collision meshes, and keeps a `NavmeshProvider`'s per-tile data
//! loaded in lockstep with its own tiles. Both providers' load calls are
//! expected to be idempotent per tile.

use std::path::Path;
use vek::*;


/// Result of asking the collision provider to load one tile.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CollisionLoad {
    Loaded,
    Error,
    /// The provider deliberately carries no data for this tile.
    Ignored,
}

/// Area info resolved from collision geometry at a point.
#[derive(Debug, Copy, Clone)]
pub struct CollisionAreaInfo {
    /// Model group flags (outdoor bits and friends).
    pub flags: u32,
    pub adt_id: i32,
    pub root_id: i32,
    pub group_id: i32,
    /// Z of the geometry surface that produced this answer.
    pub floor_z: f32,
}

/// Liquid surface resolved from collision geometry at a point.
#[derive(Debug, Copy, Clone)]
pub struct CollisionLiquid {
    /// Liquid surface level.
    pub level: f32,
    /// Floor level under the liquid column.
    pub floor: f32,
    /// Liquid entry id.
    pub entry: u32,
}

pub trait CollisionProvider: Send + Sync {
    /// Whether collision height/liquid queries are enabled at all.
    fn enabled(&self) -> bool;

    fn tile_loaded(&self, region: u32, tile: Vec2<u32>) -> bool;

    fn load_tile(&self, base_path: &Path, region: u32, tile: Vec2<u32>) -> CollisionLoad;

    fn unload_tile(&self, region: u32, tile: Vec2<u32>);

    fn unload_region(&self, region: u32);

    /// Height of the collision surface found within `search_dist` below the
    /// probe, or a value at or below `INVALID_HEIGHT` when none is. A
    /// negative `search_dist` searches upward.
    fn height(&self, region: u32, x: f32, y: f32, z: f32, search_dist: f32) -> f32;

    fn area_info(&self, region: u32, x: f32, y: f32, z: f32) -> Option<CollisionAreaInfo>;

    fn liquid_level(
        &self,
        region: u32,
        x: f32,
        y: f32,
        z: f32,
        required_types: u8,
    ) -> Option<CollisionLiquid>;
}

pub trait NavmeshProvider: Send + Sync {
    fn tile_loaded(&self, region: u32, tile: Vec2<u32>) -> bool;

    fn load_tile(&self, region: u32, tile: Vec2<u32>);

    fn unload_tile(&self, region: u32, tile: Vec2<u32>);

    fn unload_region(&self, region: u32);
}


/// Collision provider with nothing loaded and every query disabled.
pub struct NullCollision;

impl CollisionProvider for NullCollision {
    fn enabled(&self) -> bool {
        false
    }

    fn tile_loaded(&self, _region: u32, _tile: Vec2<u32>) -> bool {
        false
    }

    fn load_tile(&self, _base_path: &Path, _region: u32, _tile: Vec2<u32>) -> CollisionLoad {
        CollisionLoad::Ignored
    }

    fn unload_tile(&self, _region: u32, _tile: Vec2<u32>) {}

    fn unload_region(&self, _region: u32) {}

    fn height(&self, _region: u32, _x: f32, _y: f32, _z: f32, _search_dist: f32) -> f32 {
        tile_data::LOWEST_HEIGHT
    }

    fn area_info(&self, _region: u32, _x: f32, _y: f32, _z: f32) -> Option<CollisionAreaInfo> {
        None
    }

    fn liquid_level(
        &self,
        _region: u32,
        _x: f32,
        _y: f32,
        _z: f32,
        _required_types: u8,
    ) -> Option<CollisionLiquid> {
        None
    }
}

/// Navmesh provider with nothing loaded.
pub struct NullNavmesh;

impl NavmeshProvider for NullNavmesh {
    fn tile_loaded(&self, _region: u32, _tile: Vec2<u32>) -> bool {
        false
    }

    fn load_tile(&self, _region: u32, _tile: Vec2<u32>) {}

    fn unload_tile(&self, _region: u32, _tile: Vec2<u32>) {}

    fn unload_region(&self, _region: u32) {}
}
