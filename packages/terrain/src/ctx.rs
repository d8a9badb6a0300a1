//! Shared context threaded through the terrain stack.

use crate::{
    config::TerrainConfig,
    provider::{
        CollisionProvider,
        NavmeshProvider,
    },
    tables::TerrainTables,
};
use std::sync::Arc;


/// Everything the terrain stack consumes from the outside world, injected
/// once at construction and shared by every region.
pub struct TerrainCtx {
    pub config: TerrainConfig,
    pub collision: Arc<dyn CollisionProvider>,
    pub navmesh: Arc<dyn NavmeshProvider>,
    pub tables: Arc<dyn TerrainTables>,
}
