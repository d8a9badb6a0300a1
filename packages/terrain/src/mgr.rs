//! See `TerrainMgr`.

use crate::{
    ctx::TerrainCtx,
    region::TerrainRegion,
};
use std::{
    collections::HashMap,
    sync::Arc,
};
use parking_lot::Mutex;


/// Directory of live terrain regions.
///
/// Owns one `TerrainRegion` per region id, created on first request and
/// destroyed only through `unload_region` (policy permitting) or
/// `unload_all`. The directory lock guards only the map itself; region
/// internals have their own locks, and sweeps run on cloned handles after
/// the directory lock is released.
pub struct TerrainMgr {
    ctx: Arc<TerrainCtx>,
    regions: Mutex<HashMap<u32, Arc<TerrainRegion>>>,
}

impl TerrainMgr {
    pub fn new(ctx: TerrainCtx) -> Self {
        TerrainMgr {
            ctx: Arc::new(ctx),
            regions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ctx(&self) -> &Arc<TerrainCtx> {
        &self.ctx
    }

    /// The region's terrain, created on first use. Never fails.
    pub fn load_region(&self, region: u32) -> Arc<TerrainRegion> {
        let mut regions = self.regions.lock();
        Arc::clone(regions.entry(region).or_insert_with(|| {
            info!("creating terrain for region {}", region);
            Arc::new(TerrainRegion::new(region, Arc::clone(&self.ctx)))
        }))
    }

    /// Tear down a region's terrain, if the unload policy allows it and
    /// nothing references its tiles anymore.
    pub fn unload_region(&self, region: u32) {
        if !self.ctx.config.allow_region_unload {
            return;
        }

        let mut regions = self.regions.lock();
        let unreferenced = regions
            .get(&region)
            .map(|region| !region.referenced())
            .unwrap_or(false);
        if unreferenced {
            info!("unloading terrain for region {}", region);
            regions.remove(&region);
        }
    }

    /// Forward elapsed time to every live region's sweep.
    pub fn update(&self, elapsed_ms: u64) {
        let regions: Vec<Arc<TerrainRegion>> =
            self.regions.lock().values().cloned().collect();
        for region in regions {
            region.sweep(elapsed_ms);
        }
    }

    /// Drop every region. Process shutdown path.
    pub fn unload_all(&self) {
        self.regions.lock().clear();
    }
}
