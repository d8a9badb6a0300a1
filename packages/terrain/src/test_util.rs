//! Shared fixtures for crate tests: a byte-level tile file builder,
//! counting stub providers, and an on-disk test environment.

use crate::{
    config::TerrainConfig,
    ctx::TerrainCtx,
    provider::{
        CollisionAreaInfo,
        CollisionLiquid,
        CollisionLoad,
        CollisionProvider,
        NavmeshProvider,
    },
    region::{
        tile_file_path,
        TerrainRegion,
    },
    tables::{
        AreaEntry,
        LiquidTypeEntry,
        TerrainTables,
        WmoAreaEntry,
    },
};
use std::{
    collections::HashSet,
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
};
use byteorder::{
    LittleEndian,
    WriteBytesExt,
};
use parking_lot::Mutex;
use tile_data::{
    format,
    LOWEST_HEIGHT,
    TILE_MID,
    TILE_SIZE,
};

pub use vek::Vec2;


/// World coordinates of a tile's center.
pub fn tile_world_center(tile: Vec2<u32>) -> (f32, f32) {
    let center = |t: u32| (TILE_MID - t as f32 - 0.5) * TILE_SIZE;
    (center(tile.x), center(tile.y))
}


/// Byte-level tile file builder mirroring the on-disk layout.
#[derive(Default)]
pub struct TileFileBuilder {
    area: Option<Vec<u8>>,
    height: Option<Vec<u8>>,
    liquid: Option<Vec<u8>>,
    holes: Option<Vec<u8>>,
}

impl TileFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Area section with only the tile-wide constant id.
    pub fn constant_area(mut self, grid_area: u16) -> Self {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(format::AREA_MAGIC).unwrap();
        buf.write_u16::<LittleEndian>(format::AREA_FLAG_NO_AREA).unwrap();
        buf.write_u16::<LittleEndian>(grid_area).unwrap();
        self.area = Some(buf);
        self
    }

    /// Float-encoded height grids, all samples at `height`.
    pub fn flat_heights(mut self, height: f32) -> Self {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(format::HEIGHT_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_f32::<LittleEndian>(height).unwrap();
        buf.write_f32::<LittleEndian>(height).unwrap();
        for _ in 0..(129 * 129 + 128 * 128) {
            buf.write_f32::<LittleEndian>(height).unwrap();
        }
        self.height = Some(buf);
        self
    }

    /// Liquid section with tile-wide constants and a window covering the
    /// whole tile.
    pub fn global_liquid(self, entry: u16, flags: u8, level: f32) -> Self {
        self.windowed_liquid(entry, flags, level, Vec2::new(0, 0), Vec2::new(128, 128))
    }

    /// Liquid section with tile-wide constants and an explicit wet window.
    pub fn windowed_liquid(
        mut self,
        entry: u16,
        flags: u8,
        level: f32,
        offset: Vec2<u8>,
        size: Vec2<u8>,
    ) -> Self {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(format::LIQUID_MAGIC).unwrap();
        buf.write_u8(format::LIQUID_FLAG_NO_TYPE | format::LIQUID_FLAG_NO_HEIGHT).unwrap();
        buf.write_u8(flags).unwrap();
        buf.write_u16::<LittleEndian>(entry).unwrap();
        buf.write_u8(offset.x).unwrap();
        buf.write_u8(offset.y).unwrap();
        buf.write_u8(size.x).unwrap();
        buf.write_u8(size.y).unwrap();
        buf.write_f32::<LittleEndian>(level).unwrap();
        self.liquid = Some(buf);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut sections = Vec::new();
        let mut offset = 40u32;
        let mut directory = Vec::new();
        for section in [&self.area, &self.height, &self.liquid, &self.holes] {
            match section {
                Some(bytes) => {
                    directory.push((offset, bytes.len() as u32));
                    offset += bytes.len() as u32;
                    sections.extend_from_slice(bytes);
                }
                None => directory.push((0, 0)),
            }
        }

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(format::TILE_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(format::TILE_VERSION_MAGIC).unwrap();
        for (offset, size) in directory {
            out.write_u32::<LittleEndian>(offset).unwrap();
            out.write_u32::<LittleEndian>(size).unwrap();
        }
        out.extend_from_slice(&sections);
        out
    }
}


/// Collision provider stub tracking loaded tiles and call counts.
pub struct StubCollision {
    pub enabled: bool,
    /// Fixed answer for height probes, `LOWEST_HEIGHT` when absent.
    pub height_answer: Option<f32>,
    loaded: Mutex<HashSet<(u32, u32, u32)>>,
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

impl Default for StubCollision {
    fn default() -> Self {
        StubCollision {
            enabled: false,
            height_answer: None,
            loaded: Mutex::new(HashSet::new()),
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
        }
    }
}

impl StubCollision {
    pub fn enabled_with_height(height: f32) -> Self {
        StubCollision {
            enabled: true,
            height_answer: Some(height),
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl CollisionProvider for StubCollision {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn tile_loaded(&self, region: u32, tile: Vec2<u32>) -> bool {
        self.loaded.lock().contains(&(region, tile.x, tile.y))
    }

    fn load_tile(&self, _base_path: &Path, region: u32, tile: Vec2<u32>) -> CollisionLoad {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().insert((region, tile.x, tile.y));
        CollisionLoad::Loaded
    }

    fn unload_tile(&self, region: u32, tile: Vec2<u32>) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().remove(&(region, tile.x, tile.y));
    }

    fn unload_region(&self, region: u32) {
        self.loaded.lock().retain(|&(r, _, _)| r != region);
    }

    fn height(&self, _region: u32, _x: f32, _y: f32, _z: f32, _search_dist: f32) -> f32 {
        self.height_answer.unwrap_or(LOWEST_HEIGHT)
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

/// Navmesh provider stub tracking loaded tiles and call counts.
#[derive(Default)]
pub struct StubNavmesh {
    loaded: Mutex<HashSet<(u32, u32, u32)>>,
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

impl StubNavmesh {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl NavmeshProvider for StubNavmesh {
    fn tile_loaded(&self, region: u32, tile: Vec2<u32>) -> bool {
        self.loaded.lock().contains(&(region, tile.x, tile.y))
    }

    fn load_tile(&self, region: u32, tile: Vec2<u32>) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().insert((region, tile.x, tile.y));
    }

    fn unload_tile(&self, region: u32, tile: Vec2<u32>) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().remove(&(region, tile.x, tile.y));
    }

    fn unload_region(&self, region: u32) {
        self.loaded.lock().retain(|&(r, _, _)| r != region);
    }
}

/// In-memory metadata tables.
#[derive(Default)]
pub struct StubTables {
    pub areas: Vec<AreaEntry>,
    pub liquids: Vec<LiquidTypeEntry>,
    pub wmo: Vec<WmoAreaEntry>,
}

impl TerrainTables for StubTables {
    fn area_by_flag(&self, flag: u16, region: u32) -> Option<&AreaEntry> {
        self.areas
            .iter()
            .find(|area| area.explore_flag == flag && area.region == region)
    }

    fn area_by_id(&self, id: u32) -> Option<&AreaEntry> {
        self.areas.iter().find(|area| area.id == id)
    }

    fn liquid_type(&self, id: u32) -> Option<&LiquidTypeEntry> {
        self.liquids.iter().find(|liquid| liquid.id == id)
    }

    fn wmo_area(&self, root_id: i32, adt_id: i32, group_id: i32) -> Option<&WmoAreaEntry> {
        self.wmo.iter().find(|wmo| {
            wmo.root_id == root_id && wmo.adt_id == adt_id && wmo.group_id == group_id
        })
    }
}


/// A temp data directory plus stub collaborators, one per test.
pub struct TestEnv {
    pub dir: PathBuf,
    pub config: TerrainConfig,
    pub collision: Arc<StubCollision>,
    pub navmesh: Arc<StubNavmesh>,
    pub tables: Arc<StubTables>,
}

impl TestEnv {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir()
            .join(format!("terrain_test_{}_{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("maps")).unwrap();
        TestEnv {
            config: TerrainConfig::new(&dir),
            dir,
            collision: Arc::new(StubCollision::default()),
            navmesh: Arc::new(StubNavmesh::default()),
            tables: Arc::new(StubTables::default()),
        }
    }

    pub fn allow_region_unload(mut self) -> Self {
        self.config.allow_region_unload = true;
        self
    }

    pub fn with_collision(mut self, collision: StubCollision) -> Self {
        self.collision = Arc::new(collision);
        self
    }

    pub fn with_tables(mut self, tables: StubTables) -> Self {
        self.tables = Arc::new(tables);
        self
    }

    pub fn ctx(&self) -> TerrainCtx {
        TerrainCtx {
            config: self.config.clone(),
            collision: self.collision.clone(),
            navmesh: self.navmesh.clone(),
            tables: self.tables.clone(),
        }
    }

    pub fn region(&self, id: u32) -> TerrainRegion {
        TerrainRegion::new(id, Arc::new(self.ctx()))
    }

    pub fn write_tile_file(&self, region: u32, tile: Vec2<u32>, builder: TileFileBuilder) {
        fs::write(tile_file_path(&self.config, region, tile), builder.build()).unwrap();
    }

    pub fn write_corrupt_tile_file(&self, region: u32, tile: Vec2<u32>) {
        fs::write(
            tile_file_path(&self.config, region, tile),
            b"this is not a tile file at all, but it is long enough to parse",
        )
        .unwrap();
    }

    pub fn remove_tile_file(&self, region: u32, tile: Vec2<u32>) {
        fs::remove_file(tile_file_path(&self.config, region, tile)).unwrap();
    }
}
