//! See `TerrainTile`.

use crate::{
    coord::{
        coarse_coord,
        fine_coord,
        CELL_RES,
        INVALID_HEIGHT_VALUE,
    },
    format::{
        self,
        AreaHeader,
        FileHeader,
        HeightHeader,
        LiquidHeader,
    },
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
};
use std::{
    fs,
    io,
    path::Path,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};
use anyhow::*;


/// All terrain data of one tile, immutable once parsed.
///
/// Every sub-block is independently optional; an absent block degrades to a
/// tile-wide constant. A tile parsed from no file at all (the backing file
/// is allowed to be missing) is a valid, fully empty tile whose queries all
/// answer with sentinels.
#[derive(Debug)]
pub struct TerrainTile {
    area: Option<Box<[u16]>>,
    grid_area: u16,
    holes: Option<HoleMask>,
    grid_height: f32,
    height: HeightMap,
    liquid: Option<LiquidMap>,
    // set by the cache layer once collision-mesh and navmesh data for this
    // tile are attached; the Release store pairs with Acquire loads so a
    // reader that observes true also observes the attach
    fully_loaded: AtomicBool,
}

impl TerrainTile {
    /// A tile with no data: flat invalid height, area 0, no liquid.
    pub fn empty() -> Self {
        TerrainTile {
            area: None,
            grid_area: 0,
            holes: None,
            grid_height: INVALID_HEIGHT_VALUE,
            height: HeightMap::Flat,
            liquid: None,
            fully_loaded: AtomicBool::new(false),
        }
    }

    /// Parse a complete tile file image.
    ///
    /// Either every announced section validates and the whole tile is
    /// returned, or this errors and nothing is retained.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = FileHeader::read(&mut &*bytes)
            .context("tile file shorter than root header")?;
        ensure!(
            header.magic == format::TILE_MAGIC,
            "tile file root magic mismatch",
        );
        ensure!(
            header.version == format::TILE_VERSION_MAGIC,
            "tile file version mismatch",
        );

        let mut area = None;
        let mut grid_area = 0;
        if header.area_offset != 0 {
            let mut read = section(bytes, header.area_offset)?;
            let area_header = AreaHeader::read(&mut read)
                .context("area section truncated")?;
            ensure!(
                area_header.fourcc == format::AREA_MAGIC,
                "area section fourcc mismatch",
            );
            grid_area = area_header.grid_area;
            if area_header.flags & format::AREA_FLAG_NO_AREA == 0 {
                area = Some(
                    format::read_u16_grid(&mut read, CELL_RES * CELL_RES)
                        .context("area grid truncated")?
                );
            }
        }

        let mut holes = None;
        if header.holes_offset != 0 {
            let mut read = section(bytes, header.holes_offset)?;
            holes = Some(HoleMask::read(&mut read).context("holes section truncated")?);
        }

        let mut grid_height = INVALID_HEIGHT_VALUE;
        let mut height = HeightMap::Flat;
        if header.height_offset != 0 {
            let mut read = section(bytes, header.height_offset)?;
            let height_header = HeightHeader::read(&mut read)
                .context("height section truncated")?;
            ensure!(
                height_header.fourcc == format::HEIGHT_MAGIC,
                "height section fourcc mismatch",
            );
            grid_height = height_header.grid_height;
            height = HeightMap::read(&height_header, &mut read)
                .context("height grids truncated")?;
        }

        let mut liquid = None;
        if header.liquid_offset != 0 {
            let mut read = section(bytes, header.liquid_offset)?;
            let liquid_header = LiquidHeader::read(&mut read)
                .context("liquid section truncated")?;
            ensure!(
                liquid_header.fourcc == format::LIQUID_MAGIC,
                "liquid section fourcc mismatch",
            );
            liquid = Some(
                LiquidMap::read(&liquid_header, &mut read)
                    .context("liquid grids truncated")?
            );
        }

        Ok(TerrainTile {
            area,
            grid_area,
            holes,
            grid_height,
            height,
            liquid,
            fully_loaded: AtomicBool::new(false),
        })
    }

    /// Load a tile from its backing file.
    ///
    /// A missing file is not an error — regions without terrain data are
    /// normal — and yields an empty tile. A present but malformed file is a
    /// hard failure.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Result::Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => {
                return Err(Error::new(e)
                    .context(format!("reading tile file {}", path.display())));
            }
        };
        Self::from_bytes(&bytes)
            .with_context(|| format!("parsing tile file {}", path.display()))
    }

    /// Drop all sub-block data, leaving an empty tile. Safe to call on a
    /// tile that is already empty.
    pub fn unload(&mut self) {
        *self = Self::empty();
    }

    /// Whether collision-mesh and navmesh data for this tile have been
    /// attached by the cache layer.
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    /// Mark collision-mesh and navmesh data attached. Never un-set.
    pub fn set_fully_loaded(&self) {
        self.fully_loaded.store(true, Ordering::Release);
    }

    /// Area id of the coarse cell containing the point.
    pub fn area(&self, x: f32, y: f32) -> u16 {
        let grid = match &self.area {
            Some(grid) => grid,
            None => return self.grid_area,
        };
        let lx = coarse_coord(x);
        let ly = coarse_coord(y);
        grid[lx * CELL_RES + ly]
    }

    /// Interpolated ground height at the point, or `INVALID_HEIGHT_VALUE`
    /// over a hole or an empty tile.
    pub fn height(&self, x: f32, y: f32) -> f32 {
        let (x_int, fx) = fine_coord(x);
        let (y_int, fy) = fine_coord(y);

        if !matches!(self.height, HeightMap::Flat) {
            if let Some(holes) = &self.holes {
                if holes.is_hole(x_int, y_int) {
                    return INVALID_HEIGHT_VALUE;
                }
            }
        }

        self.height.sample(self.grid_height, x_int, y_int, fx, fy)
    }

    /// Liquid type flags of the coarse cell containing the point.
    pub fn terrain_type(&self, x: f32, y: f32) -> u8 {
        let liquid = match &self.liquid {
            Some(liquid) => liquid,
            None => return 0,
        };
        let lx = coarse_coord(x);
        let ly = coarse_coord(y);
        liquid.type_flags_cell(lx, ly)
    }

    /// Liquid surface level at the point, `INVALID_HEIGHT_VALUE` when the
    /// point misses the wet window or the tile has no liquid at all.
    pub fn liquid_level(&self, x: f32, y: f32) -> f32 {
        let liquid = match &self.liquid {
            Some(liquid) => liquid,
            None => return INVALID_HEIGHT_VALUE,
        };
        let (x_int, _) = fine_coord(x);
        let (y_int, _) = fine_coord(y);
        liquid.level_at(x_int, y_int)
    }

    /// Raw `(entry, type flags)` of the liquid cell containing the point,
    /// `(0, 0)` when the tile has no liquid block.
    pub fn liquid_cell(&self, x: f32, y: f32) -> (u16, u8) {
        let liquid = match &self.liquid {
            Some(liquid) => liquid,
            None => return (0, 0),
        };
        let (x_int, _) = fine_coord(x);
        let (y_int, _) = fine_coord(y);
        liquid.cell(x_int, y_int)
    }

    /// Whether any cell of this tile can hold liquid at all.
    pub fn has_liquid_flags(&self) -> bool {
        self.liquid.as_ref().map(|liquid| liquid.has_flags()).unwrap_or(false)
    }

    /// Classify the point against this tile's liquid column.
    ///
    /// `resolved` is the liquid `(entry, type flag set)` after the caller
    /// consulted the external liquid/area tables for the cell (see
    /// `liquid_cell`). `required_types`, when non-zero, filters which liquid
    /// kinds count. The verdict compares `delta = level - z` against the
    /// caller's collision height: deeper than the collision height is
    /// under water, any positive delta is in water, down to one unit below
    /// the surface still allows water-walking.
    pub fn liquid_status(
        &self,
        x: f32,
        y: f32,
        z: f32,
        resolved: ResolvedLiquid,
        required_types: u8,
        collision_height: f32,
    ) -> (LiquidStatus, Option<LiquidData>) {
        if resolved.type_flags == 0 {
            return (LiquidStatus::NoWater, None);
        }
        if required_types != 0 && required_types as u32 & resolved.type_flags == 0 {
            return (LiquidStatus::NoWater, None);
        }

        let liquid = match &self.liquid {
            Some(liquid) => liquid,
            None => return (LiquidStatus::NoWater, None),
        };

        let (x_int, _) = fine_coord(x);
        let (y_int, _) = fine_coord(y);
        let level = match liquid.window_level(x_int, y_int) {
            Some(level) => level,
            None => return (LiquidStatus::NoWater, None),
        };

        // liquid below the surface, or the probe far beneath the ground,
        // is not liquid contact
        let ground_level = self.height(x, y);
        if level < ground_level || z < ground_level - 2.0 {
            return (LiquidStatus::NoWater, None);
        }

        let data = LiquidData {
            entry: resolved.entry,
            type_flags: resolved.type_flags,
            level,
            depth_level: ground_level,
        };

        let delta = level - z;
        let status = if delta > collision_height {
            LiquidStatus::UnderWater
        } else if delta > 0.0 {
            LiquidStatus::InWater
        } else if delta > -1.0 {
            LiquidStatus::WaterWalk
        } else {
            LiquidStatus::AboveWater
        };
        (status, Some(data))
    }
}

fn section(bytes: &[u8], offset: u32) -> Result<&[u8]> {
    bytes
        .get(offset as usize..)
        .ok_or_else(|| anyhow!("section offset {} beyond end of file", offset))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{
        TILE_SIZE,
        HEIGHT_RES,
    };
    use byteorder::{
        LittleEndian,
        WriteBytesExt,
    };

    // minimal writer mirror of the on-disk layout, test-only
    #[derive(Default)]
    struct FileBuilder {
        area: Option<Vec<u8>>,
        height: Option<Vec<u8>>,
        liquid: Option<Vec<u8>>,
        holes: Option<Vec<u8>>,
    }

    impl FileBuilder {
        fn area_grid(mut self, grid_area: u16, grid: Option<&[u16]>) -> Self {
            let mut buf = Vec::new();
            buf.write_u32::<LittleEndian>(format::AREA_MAGIC).unwrap();
            let flags = if grid.is_some() { 0 } else { format::AREA_FLAG_NO_AREA };
            buf.write_u16::<LittleEndian>(flags).unwrap();
            buf.write_u16::<LittleEndian>(grid_area).unwrap();
            if let Some(grid) = grid {
                for &v in grid {
                    buf.write_u16::<LittleEndian>(v).unwrap();
                }
            }
            self.area = Some(buf);
            self
        }

        fn float_heights(mut self, grid_height: f32, v9: &[f32], v8: &[f32]) -> Self {
            let mut buf = Vec::new();
            buf.write_u32::<LittleEndian>(format::HEIGHT_MAGIC).unwrap();
            buf.write_u32::<LittleEndian>(0).unwrap();
            buf.write_f32::<LittleEndian>(grid_height).unwrap();
            buf.write_f32::<LittleEndian>(grid_height).unwrap();
            for &v in v9.iter().chain(v8) {
                buf.write_f32::<LittleEndian>(v).unwrap();
            }
            self.height = Some(buf);
            self
        }

        fn holes(mut self, masks: &[[u16; CELL_RES]; CELL_RES]) -> Self {
            let mut buf = Vec::new();
            for row in masks {
                for &mask in row {
                    buf.write_u16::<LittleEndian>(mask).unwrap();
                }
            }
            self.holes = Some(buf);
            self
        }

        fn global_liquid(mut self, entry: u16, flags: u8, level: f32) -> Self {
            let mut buf = Vec::new();
            buf.write_u32::<LittleEndian>(format::LIQUID_MAGIC).unwrap();
            buf.write_u8(format::LIQUID_FLAG_NO_TYPE | format::LIQUID_FLAG_NO_HEIGHT).unwrap();
            buf.write_u8(flags).unwrap();
            buf.write_u16::<LittleEndian>(entry).unwrap();
            // window covering the whole tile
            buf.write_u8(0).unwrap();
            buf.write_u8(0).unwrap();
            buf.write_u8(HEIGHT_RES as u8).unwrap();
            buf.write_u8(HEIGHT_RES as u8).unwrap();
            buf.write_f32::<LittleEndian>(level).unwrap();
            self.liquid = Some(buf);
            self
        }

        fn build(self) -> Vec<u8> {
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

    fn flat_v9_v8(height: f32) -> (Vec<f32>, Vec<f32>) {
        (vec![height; 129 * 129], vec![height; 128 * 128])
    }

    #[test]
    fn empty_tile_answers_sentinels() {
        let tile = TerrainTile::empty();
        assert_eq!(tile.height(0.0, 0.0), INVALID_HEIGHT_VALUE);
        assert_eq!(tile.area(0.0, 0.0), 0);
        assert_eq!(tile.terrain_type(0.0, 0.0), 0);
        assert_eq!(tile.liquid_level(0.0, 0.0), INVALID_HEIGHT_VALUE);
        assert!(!tile.has_liquid_flags());
    }

    #[test]
    fn parses_all_sections() {
        let mut area = vec![0u16; 256];
        area[0] = 7;
        let (v9, v8) = flat_v9_v8(25.0);
        let bytes = FileBuilder::default()
            .area_grid(3, Some(&area))
            .float_heights(25.0, &v9, &v8)
            .global_liquid(1, format::LIQUID_TYPE_WATER, 30.0)
            .build();

        let tile = TerrainTile::from_bytes(&bytes).unwrap();
        // world origin maps to coarse cell (0, 0)
        assert_eq!(tile.area(0.0, 0.0), 7);
        assert!((tile.height(-10.0, -10.0) - 25.0).abs() < 1e-4);
        assert_eq!(tile.terrain_type(0.0, 0.0), format::LIQUID_TYPE_WATER);
        assert_eq!(tile.liquid_level(-10.0, -10.0), 30.0);
        assert_eq!(tile.liquid_cell(-10.0, -10.0), (1, format::LIQUID_TYPE_WATER));
    }

    #[test]
    fn constant_area_without_grid() {
        let bytes = FileBuilder::default().area_grid(42, None).build();
        let tile = TerrainTile::from_bytes(&bytes).unwrap();
        assert_eq!(tile.area(0.0, 0.0), 42);
        assert_eq!(tile.area(-400.0, -400.0), 42);
    }

    #[test]
    fn bad_root_magic_fails() {
        let mut bytes = FileBuilder::default().area_grid(1, None).build();
        bytes[0] ^= 0xFF;
        assert!(TerrainTile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn bad_version_fails() {
        let mut bytes = FileBuilder::default().area_grid(1, None).build();
        bytes[4] ^= 0xFF;
        assert!(TerrainTile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn bad_section_fourcc_fails_whole_load() {
        let (v9, v8) = flat_v9_v8(25.0);
        let mut bytes = FileBuilder::default()
            .area_grid(3, None)
            .float_heights(25.0, &v9, &v8)
            .build();
        // corrupt the height section fourcc, leaving the valid area section
        // in front of it
        let height_offset = 40 + 8;
        bytes[height_offset] ^= 0xFF;
        assert!(TerrainTile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_grid_fails() {
        let (v9, v8) = flat_v9_v8(25.0);
        let mut bytes = FileBuilder::default().float_heights(25.0, &v9, &v8).build();
        bytes.truncate(bytes.len() - 100);
        assert!(TerrainTile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn holes_mask_heights_inside_macro_cell() {
        let (v9, v8) = flat_v9_v8(25.0);
        let mut masks = [[0u16; CELL_RES]; CELL_RES];
        masks[0][0] = 0xFFFF;
        let bytes = FileBuilder::default()
            .float_heights(25.0, &v9, &v8)
            .holes(&masks)
            .build();
        let tile = TerrainTile::from_bytes(&bytes).unwrap();

        // a point in fine cells 0..8 of both axes falls in the holed
        // macro-cell
        let step = TILE_SIZE / HEIGHT_RES as f32;
        assert_eq!(tile.height(-step * 2.5, -step * 2.5), INVALID_HEIGHT_VALUE);
        // outside the macro-cell the surface is intact
        assert!((tile.height(-step * 12.5, -step * 12.5) - 25.0).abs() < 1e-4);
    }

    #[test]
    fn unload_resets_to_empty() {
        let (v9, v8) = flat_v9_v8(25.0);
        let mut tile = TerrainTile::from_bytes(
            &FileBuilder::default().float_heights(25.0, &v9, &v8).build(),
        ).unwrap();
        assert!((tile.height(-10.0, -10.0) - 25.0).abs() < 1e-4);

        tile.unload();
        assert_eq!(tile.height(-10.0, -10.0), INVALID_HEIGHT_VALUE);
        tile.unload();
    }

    #[test]
    fn missing_file_loads_as_empty_tile() {
        let tile = TerrainTile::load(Path::new("/nonexistent/zzz/0001020.map")).unwrap();
        assert_eq!(tile.height(0.0, 0.0), INVALID_HEIGHT_VALUE);
    }

    #[test]
    fn liquid_status_classifies_by_depth() {
        let (v9, v8) = flat_v9_v8(5.0);
        let tile = TerrainTile::from_bytes(
            &FileBuilder::default()
                .float_heights(5.0, &v9, &v8)
                .global_liquid(1, format::LIQUID_TYPE_WATER, 10.0)
                .build(),
        ).unwrap();

        let resolved = ResolvedLiquid {
            entry: 1,
            type_flags: format::LIQUID_TYPE_WATER as u32,
        };
        let probe = |z| tile.liquid_status(-10.0, -10.0, z, resolved, 0, 2.0).0;

        assert_eq!(probe(7.5), LiquidStatus::UnderWater);
        assert_eq!(probe(9.5), LiquidStatus::InWater);
        assert_eq!(probe(10.5), LiquidStatus::WaterWalk);
        assert_eq!(probe(12.0), LiquidStatus::AboveWater);
    }

    #[test]
    fn liquid_status_respects_required_mask() {
        let (v9, v8) = flat_v9_v8(5.0);
        let tile = TerrainTile::from_bytes(
            &FileBuilder::default()
                .float_heights(5.0, &v9, &v8)
                .global_liquid(2, format::LIQUID_TYPE_MAGMA, 10.0)
                .build(),
        ).unwrap();

        let resolved = ResolvedLiquid {
            entry: 2,
            type_flags: format::LIQUID_TYPE_MAGMA as u32,
        };
        let (status, _) = tile.liquid_status(
            -10.0, -10.0, 9.5,
            resolved,
            format::LIQUID_TYPE_WATER,
            2.0,
        );
        assert_eq!(status, LiquidStatus::NoWater);
    }

    #[test]
    fn liquid_status_rejects_probe_far_below_ground() {
        let (v9, v8) = flat_v9_v8(5.0);
        let tile = TerrainTile::from_bytes(
            &FileBuilder::default()
                .float_heights(5.0, &v9, &v8)
                .global_liquid(1, format::LIQUID_TYPE_WATER, 10.0)
                .build(),
        ).unwrap();

        let resolved = ResolvedLiquid {
            entry: 1,
            type_flags: format::LIQUID_TYPE_WATER as u32,
        };
        let (status, _) = tile.liquid_status(-10.0, -10.0, -100.0, resolved, 0, 2.0);
        assert_eq!(status, LiquidStatus::NoWater);
    }
}
