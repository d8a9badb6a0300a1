//! See `TerrainRegion`.

use crate::{
    ctx::TerrainCtx,
    config::TerrainConfig,
    provider::CollisionLoad,
    tables,
    timer::IntervalTimer,
};
use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};
use parking_lot::{
    Mutex,
    RwLock,
};
use rand::Rng;
use tile_data::{
    format,
    world_to_tile,
    FileHeader,
    LiquidData,
    LiquidStatus,
    ResolvedLiquid,
    TerrainTile,
    INVALID_HEIGHT,
    LOWEST_HEIGHT,
    TILE_COUNT,
};
use vek::*;


/// Default downward search distance for collision height queries.
pub const DEFAULT_HEIGHT_SEARCH: f32 = 50.0;

/// Default search distance when establishing ground level under liquid.
pub const DEFAULT_WATER_SEARCH: f32 = 50.0;

/// Default body height used to separate "in water" from "under water".
pub const DEFAULT_COLLISION_HEIGHT: f32 = 2.03;

// tiles are reclaimed at most once a minute; the first sweep of each region
// fires 20-40s in so regions started together don't all sweep at once
const SWEEP_INTERVAL_MS: u64 = 60_000;
const SWEEP_MIN_PHASE_MS: u64 = 20_000;
const SWEEP_MAX_PHASE_MS: u64 = 40_000;


/// One world region's tile cache and query surface.
///
/// Tiles load lazily on the first query that touches them and are shared
/// out as `Arc`s: a caller's clone stays valid for the duration of its call
/// even if the sweep evicts the slot concurrently, since eviction only
/// drops the cache's own strong reference. Callers that need a tile to stay
/// resident across calls hold a reference via `ref_tile`.
pub struct TerrainRegion {
    region: u32,
    ctx: Arc<TerrainCtx>,
    slots: Vec<Slot>,
    // serializes the load-or-not decision per slot and keeps the sweep from
    // racing a loader; the per-slot read path never takes it
    load_lock: Mutex<()>,
    sweep_timer: Mutex<IntervalTimer>,
}

#[derive(Default)]
struct Slot {
    state: RwLock<SlotState>,
}

#[derive(Default)]
struct SlotState {
    tile: Option<Arc<TerrainTile>>,
    refs: u32,
    // sticky after a failed load so repeated queries against a bad or
    // missing-and-malformed file don't retry I/O every call
    load_attempted: bool,
}

impl TerrainRegion {
    pub fn new(region: u32, ctx: Arc<TerrainCtx>) -> Self {
        let phase = rand::thread_rng().gen_range(SWEEP_MIN_PHASE_MS..=SWEEP_MAX_PHASE_MS);
        TerrainRegion {
            region,
            ctx,
            slots: (0..TILE_COUNT * TILE_COUNT).map(|_| Slot::default()).collect(),
            load_lock: Mutex::new(()),
            sweep_timer: Mutex::new(IntervalTimer::with_phase(SWEEP_INTERVAL_MS, phase)),
        }
    }

    pub fn region_id(&self) -> u32 {
        self.region
    }

    fn slot(&self, tile: Vec2<u32>) -> &Slot {
        &self.slots[tile.x as usize * TILE_COUNT + tile.y as usize]
    }

    /// Tile containing the world position, loading it if needed.
    ///
    /// The fast path returns an already fully loaded tile (or any loaded
    /// tile when `map_only`) off a shared slot read alone. A slot whose
    /// last load failed stays empty until an explicit `load`.
    pub fn get(&self, x: f32, y: f32, map_only: bool) -> Option<Arc<TerrainTile>> {
        let t = world_to_tile(x, y);
        if t.x < 0 || t.x >= TILE_COUNT as i32 || t.y < 0 || t.y >= TILE_COUNT as i32 {
            return None;
        }
        let tile = Vec2::new(t.x as u32, t.y as u32);

        {
            let state = self.slot(tile).state.read();
            match &state.tile {
                Some(loaded) => {
                    if loaded.is_fully_loaded() || map_only {
                        return Some(Arc::clone(loaded));
                    }
                }
                None => {
                    if state.load_attempted {
                        return None;
                    }
                }
            }
        }

        self.load_slot(tile, map_only)
    }

    /// Explicitly load and reference a tile (pre-warm path).
    ///
    /// References the slot first, so the loaded tile survives sweeps until
    /// a matching `unref_tile`. Unlike `get`, this retries a slot whose
    /// previous load failed.
    pub fn load(&self, tile: Vec2<u32>, map_only: bool) -> Option<Arc<TerrainTile>> {
        assert!(tile.x < TILE_COUNT as u32 && tile.y < TILE_COUNT as u32);

        self.ref_tile(tile);

        {
            let state = self.slot(tile).state.read();
            if let Some(loaded) = &state.tile {
                return Some(Arc::clone(loaded));
            }
        }

        self.load_slot(tile, map_only)
    }

    // slow path: load the tile file and attach provider data, double-checked
    // under the region load lock
    fn load_slot(&self, tile: Vec2<u32>, map_only: bool) -> Option<Arc<TerrainTile>> {
        {
            let state = self.slot(tile).state.read();
            if (state.tile.is_some() && map_only)
                || (self.ctx.collision.tile_loaded(self.region, tile)
                    && self.ctx.navmesh.tile_loaded(self.region, tile))
            {
                return state.tile.clone();
            }
        }

        let _load = self.load_lock.lock();

        // double-checked: another thread may have populated the slot while
        // we waited on the lock; its full load completed before it released
        // the lock, so the tile we observe here is complete
        let mut loaded = self.slot(tile).state.read().tile.clone();
        if loaded.is_none() {
            let path = tile_file_path(&self.ctx.config, self.region, tile);
            debug!("loading tile file {}", path.display());

            match TerrainTile::load(&path) {
                Ok(parsed) => {
                    let arc = Arc::new(parsed);
                    let mut state = self.slot(tile).state.write();
                    state.tile = Some(Arc::clone(&arc));
                    state.load_attempted = true;
                    loaded = Some(arc);
                }
                Err(e) => {
                    error!("error loading tile file: {:#}", e);
                    let mut state = self.slot(tile).state.write();
                    state.load_attempted = true;
                    return None;
                }
            }
        }

        if map_only {
            return loaded;
        }

        if !self.ctx.collision.tile_loaded(self.region, tile) {
            let base = self.ctx.config.data_path.join("vmaps");
            match self.ctx.collision.load_tile(&base, self.region, tile) {
                CollisionLoad::Loaded => {
                    debug!(
                        "collision mesh loaded, region {} tile {},{}",
                        self.region, tile.x, tile.y,
                    );
                }
                CollisionLoad::Error => {
                    warn!(
                        "could not load collision mesh, region {} tile {},{}",
                        self.region, tile.x, tile.y,
                    );
                }
                CollisionLoad::Ignored => {
                    debug!(
                        "collision mesh ignored, region {} tile {},{}",
                        self.region, tile.x, tile.y,
                    );
                }
            }
        }

        if !self.ctx.navmesh.tile_loaded(self.region, tile) {
            self.ctx.navmesh.load_tile(self.region, tile);
        }

        if let Some(loaded) = &loaded {
            loaded.set_fully_loaded();
        }
        loaded
    }

    /// Take a reference on a tile slot, returning the new count.
    pub fn ref_tile(&self, tile: Vec2<u32>) -> u32 {
        let mut state = self.slot(tile).state.write();
        state.refs += 1;
        state.refs
    }

    /// Drop a reference on a tile slot, returning the new count. A no-op at
    /// zero. Reaching zero on a loaded slot clears the sticky load-attempted
    /// flag so a later query retries cleanly after the slot is swept.
    pub fn unref_tile(&self, tile: Vec2<u32>) -> u32 {
        let mut state = self.slot(tile).state.write();
        if state.refs > 0 {
            state.refs -= 1;
        }
        if state.refs == 0 && state.tile.is_some() {
            state.load_attempted = false;
        }
        state.refs
    }

    /// Whether any slot still holds references.
    pub fn referenced(&self) -> bool {
        self.slots.iter().any(|slot| slot.state.read().refs > 0)
    }

    /// Advance the sweep timer; when a full interval has accumulated,
    /// reclaim every loaded, unreferenced tile and release its collision
    /// and navmesh data. Best-effort, never fails.
    pub fn sweep(&self, elapsed_ms: u64) {
        {
            let mut timer = self.sweep_timer.lock();
            timer.update(elapsed_ms);
            if !timer.passed() {
                return;
            }
            timer.reset();
        }

        // hold the load lock for the scan so a racing loader can't
        // repopulate a slot mid-eviction
        let _load = self.load_lock.lock();

        let mut evicted = 0usize;
        for x in 0..TILE_COUNT as u32 {
            for y in 0..TILE_COUNT as u32 {
                let tile = Vec2::new(x, y);
                let dropped = {
                    let mut state = self.slot(tile).state.write();
                    if state.refs == 0 && state.tile.is_some() {
                        state.load_attempted = false;
                        state.tile.take()
                    } else {
                        None
                    }
                };
                if let Some(dropped) = dropped {
                    drop(dropped);
                    self.ctx.collision.unload_tile(self.region, tile);
                    self.ctx.navmesh.unload_tile(self.region, tile);
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            debug!("region {} sweep evicted {} tiles", self.region, evicted);
        }
    }

    // ==== composite queries ====

    /// Whether liquid level can be answered at all here, from either the
    /// collision provider or loaded tile data.
    pub fn can_check_liquid_level(&self, x: f32, y: f32) -> bool {
        self.ctx.collision.enabled() || self.get(x, y, false).is_some()
    }

    /// Ground height under (or well-defined above) the probe, combining the
    /// tile surface with collision geometry.
    ///
    /// The collision search starts from slightly above the probe and widens
    /// until it at least reaches the tile surface, so a probe far above
    /// ground doesn't miss geometry that the coarser tile surface proves is
    /// there. When both sources answer, the tile surface wins unless the
    /// probe is already beneath it or the collision surface lies above it.
    pub fn height_static(
        &self,
        x: f32,
        y: f32,
        z: f32,
        use_collision: bool,
        max_search_dist: f32,
    ) -> f32 {
        let mut map_height = LOWEST_HEIGHT;
        let mut collision_height = LOWEST_HEIGHT;

        if let Some(tile) = self.get(x, y, false) {
            map_height = tile.height(x, y);
        }

        if use_collision && self.ctx.collision.enabled() {
            let z2 = z + 2.0;
            let mut search = max_search_dist;
            if map_height > INVALID_HEIGHT && z2 - map_height > search {
                search = z2 - map_height + 1.0;
            }

            collision_height = self.ctx.collision.height(self.region, x, y, z2, search);

            // not in the expected corridor: the probe may be far above the
            // floor but below the tile surface
            if collision_height <= INVALID_HEIGHT {
                collision_height = self.ctx.collision.height(self.region, x, y, z2, 10_000.0);
            }

            // look upward
            if collision_height <= INVALID_HEIGHT
                && map_height > z2
                && (z2 - map_height).abs() > 30.0
            {
                collision_height = self.ctx.collision.height(self.region, x, y, z2, -search);
            }

            // still nothing: look just above the tile surface
            if collision_height <= INVALID_HEIGHT
                && map_height > INVALID_HEIGHT
                && z2 < map_height
            {
                collision_height = self.ctx.collision.height(
                    self.region,
                    x,
                    y,
                    map_height + 2.0,
                    DEFAULT_HEIGHT_SEARCH,
                );
            }
        }

        if collision_height > INVALID_HEIGHT {
            if map_height > INVALID_HEIGHT {
                if z < map_height || collision_height > map_height {
                    collision_height
                } else {
                    map_height
                }
            } else {
                collision_height
            }
        } else {
            map_height
        }
    }

    /// Collision-geometry area info at the probe, rejected when the tile
    /// surface lies between the probe and the geometry that answered.
    pub fn area_info(&self, x: f32, y: f32, z: f32) -> Option<crate::provider::CollisionAreaInfo> {
        let info = self.ctx.collision.area_info(self.region, x, y, z)?;
        if let Some(tile) = self.get(x, y, false) {
            let map_height = tile.height(x, y);
            if z + 2.0 > map_height && map_height > info.floor_z {
                return None;
            }
        }
        Some(info)
    }

    /// Whether the probe stands in the open rather than inside a model.
    pub fn is_outdoors(&self, x: f32, y: f32, z: f32) -> bool {
        match self.area_info(x, y, z) {
            // no model found: outside by default
            None => true,
            Some(info) => is_outdoor_wmo(info.flags, self.region),
        }
    }

    /// Exploration flag of the area containing the probe: model areas from
    /// collision geometry first, then the tile's area grid.
    pub fn area_flag(&self, x: f32, y: f32, z: f32) -> u16 {
        if let Some(info) = self.area_info(x, y, z) {
            if let Some(wmo) = self.ctx.tables.wmo_area(info.root_id, info.adt_id, info.group_id) {
                if let Some(area) = self.ctx.tables.area_by_id(wmo.area_id) {
                    if area.region == self.region {
                        return area.explore_flag;
                    }
                }
            }
        }

        match self.get(x, y, true) {
            Some(tile) => tile.area(x, y),
            // not every region has tile files; unknown area then
            None => 0,
        }
    }

    pub fn area_id(&self, x: f32, y: f32, z: f32) -> u32 {
        tables::area_id_by_flag(&*self.ctx.tables, self.area_flag(x, y, z), self.region)
    }

    pub fn zone_id(&self, x: f32, y: f32, z: f32) -> u32 {
        tables::zone_id_by_flag(&*self.ctx.tables, self.area_flag(x, y, z), self.region)
    }

    pub fn zone_and_area(&self, x: f32, y: f32, z: f32) -> (u32, u32) {
        tables::zone_and_area_by_flag(&*self.ctx.tables, self.area_flag(x, y, z), self.region)
    }

    /// Localized name of the area containing the probe, `<unknown>` when no
    /// table row names it.
    pub fn area_name(&self, x: f32, y: f32, z: f32, locale: usize) -> String {
        if let Some(info) = self.area_info(x, y, z) {
            if let Some(wmo) = self.ctx.tables.wmo_area(info.root_id, info.adt_id, info.group_id) {
                if let Some(name) = wmo.names.get(locale).filter(|name| !name.is_empty()) {
                    return name.clone();
                }
                // unnamed WMO area: fall back to its parent area row
                if let Some(area) = self.ctx.tables.area_by_id(wmo.area_id) {
                    if let Some(name) = area.names.get(locale).filter(|name| !name.is_empty()) {
                        return name.clone();
                    }
                }
            }
        }

        if let Some(tile) = self.get(x, y, true) {
            if let Some(area) = self.ctx.tables.area_by_flag(tile.area(x, y), self.region) {
                if let Some(name) = area.names.get(locale).filter(|name| !name.is_empty()) {
                    return name.clone();
                }
            }
        }

        "<unknown>".to_owned()
    }

    /// Liquid type flags of the tile cell containing the point.
    pub fn terrain_type(&self, x: f32, y: f32) -> u8 {
        match self.get(x, y, false) {
            Some(tile) => tile.terrain_type(x, y),
            None => 0,
        }
    }

    /// Classify the probe against liquid: collision-geometry liquid first,
    /// then the tile's liquid data.
    pub fn liquid_status(
        &self,
        x: f32,
        y: f32,
        z: f32,
        required_types: u8,
        collision_height: f32,
    ) -> (LiquidStatus, Option<LiquidData>) {
        let ground_level = self.height_static(x, y, z, true, DEFAULT_WATER_SEARCH);

        if let Some(liquid) =
            self.ctx.collision.liquid_level(self.region, x, y, z, required_types)
        {
            if liquid.level > liquid.floor && z > liquid.floor - 2.0 {
                let resolved = self.resolve_collision_liquid(x, y, z, liquid.entry);
                let data = LiquidData {
                    entry: resolved.entry,
                    type_flags: resolved.type_flags,
                    level: liquid.level,
                    depth_level: liquid.floor,
                };

                let delta = liquid.level - z;
                let status = if delta > collision_height {
                    LiquidStatus::UnderWater
                } else if delta > 0.0 {
                    LiquidStatus::InWater
                } else if delta > -1.0 {
                    LiquidStatus::WaterWalk
                } else {
                    LiquidStatus::AboveWater
                };
                return (status, Some(data));
            }
        } else if let Some(tile) = self.get(x, y, false) {
            if tile.has_liquid_flags() {
                let resolved = self.resolve_tile_liquid(&tile, x, y);
                let (status, data) =
                    tile.liquid_status(x, y, z, resolved, required_types, collision_height);
                // a tile answer below the collision-established ground is a
                // liquid surface buried under geometry; not liquid contact
                if status != LiquidStatus::NoWater {
                    if let Some(data) = data {
                        if data.level > ground_level {
                            return (status, Some(data));
                        }
                    }
                }
            }
        }

        (LiquidStatus::NoWater, None)
    }

    // resolve a tile liquid cell's raw (entry, flags) against the external
    // tables: only the deep-water bit of the raw flags survives, the kind
    // bit comes from the table row, and areas may override entries 1..=20
    fn resolve_tile_liquid(&self, tile: &TerrainTile, x: f32, y: f32) -> ResolvedLiquid {
        let (raw_entry, raw_flags) = tile.liquid_cell(x, y);
        let mut entry = raw_entry as u32;
        let mut type_flags = raw_flags as u32;

        if let Some(liquid) = self.ctx.tables.liquid_type(entry) {
            entry = liquid.id;
            type_flags &= format::LIQUID_TYPE_DEEP_WATER as u32;
            let mut category = liquid.category;

            if (1..=tables::LIQUID_OVERRIDE_ENTRIES as u32).contains(&entry) {
                if let Some(area) = self.ctx.tables.area_by_flag(tile.area(x, y), self.region) {
                    let mut override_entry = area.liquid_override[(entry - 1) as usize];
                    if override_entry == 0 && area.zone != 0 {
                        if let Some(zone) = self.ctx.tables.area_by_id(area.zone) {
                            override_entry = zone.liquid_override[(entry - 1) as usize];
                        }
                    }
                    if let Some(liquid) = self.ctx.tables.liquid_type(override_entry) {
                        entry = override_entry;
                        category = liquid.category;
                    }
                }
            }

            type_flags |= 1 << category;
        }

        ResolvedLiquid { entry, type_flags }
    }

    // same override resolution for a liquid entry reported by collision
    // geometry, where the area comes from the full area-flag query
    fn resolve_collision_liquid(&self, x: f32, y: f32, z: f32, raw_entry: u32) -> ResolvedLiquid {
        let mut entry = raw_entry;
        let mut category = match self.ctx.tables.liquid_type(entry) {
            Some(liquid) => liquid.category,
            None => 0,
        };

        if (1..=tables::LIQUID_OVERRIDE_ENTRIES as u32).contains(&entry) {
            if let Some(area) = self
                .ctx
                .tables
                .area_by_flag(self.area_flag(x, y, z), self.region)
            {
                let mut override_entry = area.liquid_override[(entry - 1) as usize];
                if override_entry == 0 && area.zone != 0 {
                    if let Some(zone) = self.ctx.tables.area_by_id(area.zone) {
                        override_entry = zone.liquid_override[(entry - 1) as usize];
                    }
                }
                if let Some(liquid) = self.ctx.tables.liquid_type(override_entry) {
                    entry = override_entry;
                    category = liquid.category;
                }
            }
        }

        ResolvedLiquid { entry, type_flags: 1 << category }
    }

    /// Whether the probe touches liquid at all.
    pub fn is_in_water(&self, x: f32, y: f32, z: f32) -> bool {
        if !self.can_check_liquid_level(x, y) {
            return false;
        }
        let (status, _) = self.liquid_status(
            x,
            y,
            z,
            format::LIQUID_ALL_TYPES,
            DEFAULT_COLLISION_HEIGHT,
        );
        status.is_liquid()
    }

    /// Whether the liquid column at the probe is deep enough to swim in.
    pub fn is_swimmable(&self, x: f32, y: f32, z: f32, radius: f32) -> bool {
        if !self.can_check_liquid_level(x, y) {
            return false;
        }
        let (status, data) = self.liquid_status(
            x,
            y,
            z,
            format::LIQUID_ALL_TYPES,
            DEFAULT_COLLISION_HEIGHT,
        );
        if !status.is_liquid() {
            return false;
        }
        data.map(|data| data.level - data.depth_level > radius).unwrap_or(false)
    }

    /// Whether the probe is fully submerged in water or ocean.
    pub fn is_under_water(&self, x: f32, y: f32, z: f32) -> bool {
        if !self.can_check_liquid_level(x, y) {
            return false;
        }
        let (status, _) = self.liquid_status(
            x,
            y,
            z,
            format::LIQUID_TYPE_WATER | format::LIQUID_TYPE_OCEAN,
            DEFAULT_COLLISION_HEIGHT,
        );
        status.intersects(LiquidStatus::UnderWater as u32)
    }

    /// Liquid surface level over the probe, or `LOWEST_HEIGHT` when there
    /// is none.
    pub fn water_level(&self, x: f32, y: f32, z: f32) -> f32 {
        if !self.can_check_liquid_level(x, y) {
            return LOWEST_HEIGHT;
        }

        // ground level (tile surface included) anchors the liquid probe
        let ground = self.height_static(x, y, z, true, DEFAULT_WATER_SEARCH);
        let (status, data) = self.liquid_status(
            x,
            y,
            ground,
            format::LIQUID_ALL_TYPES,
            DEFAULT_COLLISION_HEIGHT,
        );
        if !status.is_liquid() {
            return LOWEST_HEIGHT;
        }
        data.map(|data| data.level).unwrap_or(LOWEST_HEIGHT)
    }

    /// The level a unit at the probe should rest at: the liquid surface
    /// when the column is deep enough (held `min_water_depth` under it when
    /// swimming), the ground otherwise.
    pub fn water_or_ground_level(
        &self,
        x: f32,
        y: f32,
        ground_z: f32,
        swim: bool,
        min_water_depth: f32,
    ) -> f32 {
        if !self.can_check_liquid_level(x, y) {
            return LOWEST_HEIGHT;
        }

        let (status, data) = self.liquid_status(
            x,
            y,
            ground_z,
            format::LIQUID_ALL_TYPES,
            DEFAULT_COLLISION_HEIGHT,
        );
        if !status.is_liquid() {
            return ground_z;
        }
        let level = data.map(|data| data.level).unwrap_or(ground_z);

        if swim {
            // shallow water: rest on the ground under it
            if level - ground_z > min_water_depth {
                level - min_water_depth
            } else {
                ground_z
            }
        } else {
            level
        }
    }
}

impl Drop for TerrainRegion {
    fn drop(&mut self) {
        self.ctx.collision.unload_region(self.region);
        self.ctx.navmesh.unload_region(self.region);
    }
}

// in flyable areas mounting up is also allowed if the extended flag is set
fn is_outdoor_wmo(flags: u32, region: u32) -> bool {
    if region == 530 {
        flags & 0x8008 != 0
    } else {
        flags & 0x8000 != 0
    }
}


/// Path of a tile's backing file under the configured data directory.
pub fn tile_file_path(config: &TerrainConfig, region: u32, tile: Vec2<u32>) -> PathBuf {
    config
        .data_path
        .join("maps")
        .join(format!("{:03}{:02}{:02}.map", region, tile.x, tile.y))
}

/// Whether a tile's backing file exists with a compatible format version.
pub fn tile_file_exists(config: &TerrainConfig, region: u32, tile: Vec2<u32>) -> bool {
    let path = tile_file_path(config, region, tile);
    let mut file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(_) => {
            error!("tile file {} does not exist", path.display());
            return false;
        }
    };

    match FileHeader::read(&mut file) {
        Ok(header)
            if header.magic == format::TILE_MAGIC
                && header.version == format::TILE_VERSION_MAGIC =>
        {
            true
        }
        _ => {
            error!("tile file {} is an incompatible version", path.display());
            false
        }
    }
}
