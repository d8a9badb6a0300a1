//! Process-level configuration consumed by the terrain stack.

use std::path::PathBuf;


/// Configuration handed in by the embedding process.
///
/// The terrain stack holds no global state; whoever owns the `TerrainMgr`
/// decides where data lives and how regions may be torn down.
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Directory containing the `maps/` tree of tile files (and the
    /// collision provider's data next to it).
    pub data_path: PathBuf,
    /// Whether `TerrainMgr::unload_region` may actually tear a region down.
    pub allow_region_unload: bool,
    /// Index into localized name arrays of the metadata tables.
    pub default_locale: usize,
}

impl TerrainConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        TerrainConfig {
            data_path: data_path.into(),
            allow_region_unload: false,
            default_locale: 0,
        }
    }
}
