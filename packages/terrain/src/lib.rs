//! Concurrent terrain query stack.
//!
//! Sits on top of `tile_data` and answers spatial questions — ground
//! height, area/zone classification, liquid state — for any number of world
//! regions, each a 64×64 grid of lazily loaded tiles. Tiles are loaded on
//! the first query that touches them, shared by reference count, and
//! reclaimed by a periodic sweep once unreferenced. Collision-mesh and
//! navmesh data live in external providers behind narrow traits; this crate
//! coordinates their tile lifecycles with its own and merges their answers
//! into the composite queries.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod ctx;
pub mod mgr;
pub mod provider;
pub mod region;
pub mod tables;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_util;

pub use self::{
    config::TerrainConfig,
    ctx::TerrainCtx,
    mgr::TerrainMgr,
    provider::{
        CollisionAreaInfo,
        CollisionLiquid,
        CollisionLoad,
        CollisionProvider,
        NavmeshProvider,
        NullCollision,
        NullNavmesh,
    },
    region::TerrainRegion,
    tables::{
        AreaEntry,
        LiquidTypeEntry,
        NullTables,
        TerrainTables,
        WmoAreaEntry,
    },
    timer::IntervalTimer,
};
