//! Read-only metadata tables consulted by terrain queries.
//!
//! Area rows, liquid kinds and WMO area names live in external lookup
//! tables owned by the embedding process; queries only ever read a handful
//! of fields from them, captured by the row structs here.


/// Number of liquid entries the per-area override table covers.
pub const LIQUID_OVERRIDE_ENTRIES: usize = 20;

/// One liquid kind.
#[derive(Debug, Clone)]
pub struct LiquidTypeEntry {
    pub id: u32,
    /// Category index; `1 << category` is the liquid's type flag bit.
    pub category: u32,
}

/// One area (or zone) row.
#[derive(Debug, Clone)]
pub struct AreaEntry {
    pub id: u32,
    /// Enclosing zone id, 0 when this row is itself a zone.
    pub zone: u32,
    /// Exploration flag, the id tiles store in their area grids.
    pub explore_flag: u16,
    /// Region this area belongs to.
    pub region: u32,
    /// Per-area liquid replacement, indexed by `entry - 1` for entries
    /// 1..=20; 0 means no override.
    pub liquid_override: [u32; LIQUID_OVERRIDE_ENTRIES],
    /// Localized display names.
    pub names: Vec<String>,
}

/// One WMO area row, keyed by the (root, adt, group) triple collision
/// geometry reports.
#[derive(Debug, Clone)]
pub struct WmoAreaEntry {
    pub root_id: i32,
    pub adt_id: i32,
    pub group_id: i32,
    /// Area row this WMO area maps to.
    pub area_id: u32,
    /// Localized display names.
    pub names: Vec<String>,
}

pub trait TerrainTables: Send + Sync {
    fn area_by_flag(&self, flag: u16, region: u32) -> Option<&AreaEntry>;

    fn area_by_id(&self, id: u32) -> Option<&AreaEntry>;

    fn liquid_type(&self, id: u32) -> Option<&LiquidTypeEntry>;

    fn wmo_area(&self, root_id: i32, adt_id: i32, group_id: i32) -> Option<&WmoAreaEntry>;
}


/// Area id for an exploration flag, 0 when unknown.
pub fn area_id_by_flag(tables: &dyn TerrainTables, flag: u16, region: u32) -> u32 {
    tables
        .area_by_flag(flag, region)
        .map(|area| area.id)
        .unwrap_or(0)
}

/// Zone id for an exploration flag — the enclosing zone, or the area itself
/// when it is a zone. 0 when unknown.
pub fn zone_id_by_flag(tables: &dyn TerrainTables, flag: u16, region: u32) -> u32 {
    tables
        .area_by_flag(flag, region)
        .map(|area| if area.zone != 0 { area.zone } else { area.id })
        .unwrap_or(0)
}

/// Both of the above in one lookup.
pub fn zone_and_area_by_flag(
    tables: &dyn TerrainTables,
    flag: u16,
    region: u32,
) -> (u32, u32) {
    match tables.area_by_flag(flag, region) {
        Some(area) => (
            if area.zone != 0 { area.zone } else { area.id },
            area.id,
        ),
        None => (0, 0),
    }
}


/// Tables with no rows at all.
pub struct NullTables;

impl TerrainTables for NullTables {
    fn area_by_flag(&self, _flag: u16, _region: u32) -> Option<&AreaEntry> {
        None
    }

    fn area_by_id(&self, _id: u32) -> Option<&AreaEntry> {
        None
    }

    fn liquid_type(&self, _id: u32) -> Option<&LiquidTypeEntry> {
        None
    }

    fn wmo_area(&self, _root_id: i32, _adt_id: i32, _group_id: i32) -> Option<&WmoAreaEntry> {
        None
    }
}
