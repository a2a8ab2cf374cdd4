use romkit_project::Project;
use romkit_rom::RomImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModuleError, ModuleResult};
use crate::layout::MapSpec;
use crate::pointer::PointerUpdate;
use crate::resource::{Resource, TileMap};
use crate::traits::Module;

pub const MAPS_MODULE: &str = "maps";

/// Project path of a map stored as TOML.
pub fn map_file_path(name: &str) -> String {
    format!("maps/{name}.toml")
}

/// On-disk form: one hex string per row.
#[derive(Debug, Serialize, Deserialize)]
struct MapFile {
    width: usize,
    height: usize,
    rows: Vec<String>,
}

impl MapFile {
    fn from_map(map: &TileMap) -> Self {
        Self {
            width: map.width,
            height: map.height,
            rows: (0..map.height).map(|y| hex::encode_upper(map.row(y))).collect(),
        }
    }
}

/// Fixed-size tile maps, rewritten in place.
pub struct MapsModule {
    maps: Vec<MapSpec>,
}

impl MapsModule {
    pub fn new(maps: Vec<MapSpec>) -> Self {
        Self { maps }
    }

    fn spec(&self, name: &str) -> Option<&MapSpec> {
        self.maps.iter().find(|m| m.name == name)
    }

    /// Build a map from raw row-major bytes, checking them against the layout.
    pub fn map_from_raw(&self, name: &str, tiles: Vec<u8>) -> ModuleResult<TileMap> {
        let spec = self
            .spec(name)
            .ok_or_else(|| ModuleError::resource(MAPS_MODULE, name, "map is not in the layout"))?;
        if tiles.len() != spec.byte_len() {
            return Err(ModuleError::resource(
                MAPS_MODULE,
                name,
                format!("expected {} tile bytes, found {}", spec.byte_len(), tiles.len()),
            ));
        }
        Ok(TileMap {
            name: name.to_string(),
            width: spec.width,
            height: spec.height,
            tiles,
        })
    }

    fn parse(&self, spec: &MapSpec, file: MapFile) -> ModuleResult<TileMap> {
        let bad = |reason: String| ModuleError::resource(MAPS_MODULE, &spec.name, reason);
        if (file.width, file.height) != (spec.width, spec.height) {
            return Err(bad(format!(
                "map is {}x{}, layout expects {}x{}",
                file.width, file.height, spec.width, spec.height
            )));
        }
        if file.rows.len() != spec.height {
            return Err(bad(format!("expected {} rows, found {}", spec.height, file.rows.len())));
        }
        let mut tiles = Vec::with_capacity(spec.byte_len());
        for (y, row) in file.rows.iter().enumerate() {
            let bytes = hex::decode(row.trim()).map_err(|e| bad(format!("row {y}: {e}")))?;
            if bytes.len() != spec.width {
                return Err(bad(format!("row {y} has {} tiles, expected {}", bytes.len(), spec.width)));
            }
            tiles.extend_from_slice(&bytes);
        }
        Ok(TileMap {
            name: spec.name.clone(),
            width: spec.width,
            height: spec.height,
            tiles,
        })
    }

    fn as_maps<'r>(&self, resource: &'r Resource) -> ModuleResult<&'r [TileMap]> {
        match resource {
            Resource::Maps(maps) => Ok(maps),
            other => Err(ModuleError::WrongResource {
                module: MAPS_MODULE,
                found: other.kind(),
            }),
        }
    }
}

impl Module for MapsModule {
    fn id(&self) -> &'static str {
        MAPS_MODULE
    }

    fn description(&self) -> &'static str {
        "fixed-size tile maps"
    }

    fn read_from_rom(&self, rom: &RomImage) -> ModuleResult<Resource> {
        let mut maps = Vec::with_capacity(self.maps.len());
        for spec in &self.maps {
            let tiles = rom.read(spec.offset, spec.byte_len())?.to_vec();
            maps.push(TileMap {
                name: spec.name.clone(),
                width: spec.width,
                height: spec.height,
                tiles,
            });
        }
        Ok(Resource::Maps(maps))
    }

    fn write_to_rom(&self, rom: &mut RomImage, resource: &Resource) -> ModuleResult<Vec<PointerUpdate>> {
        for map in self.as_maps(resource)? {
            let spec = self
                .spec(&map.name)
                .ok_or_else(|| ModuleError::resource(MAPS_MODULE, &map.name, "map is not in the layout"))?;
            if map.tiles.len() != spec.byte_len() {
                return Err(ModuleError::resource(MAPS_MODULE, &map.name, "tile count does not match the layout"));
            }
            if rom.read(spec.offset, spec.byte_len())? != map.tiles.as_slice() {
                rom.write(spec.offset, &map.tiles)?;
                debug!(map = %map.name, offset = spec.offset, "wrote map");
            }
        }
        Ok(Vec::new())
    }

    fn read_from_project(&self, project: &Project) -> ModuleResult<Resource> {
        let mut maps = Vec::with_capacity(self.maps.len());
        for spec in &self.maps {
            let file: MapFile = project
                .read_resource_toml(MAPS_MODULE, &spec.name)
                .map_err(|e| ModuleError::resource(MAPS_MODULE, &spec.name, e))?;
            maps.push(self.parse(spec, file)?);
        }
        Ok(Resource::Maps(maps))
    }

    fn write_to_project(&self, project: &mut Project, resource: &Resource) -> ModuleResult<()> {
        for map in self.as_maps(resource)? {
            project.write_resource_toml(
                MAPS_MODULE,
                &map.name,
                &map_file_path(&map.name),
                &MapFile::from_map(map),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> MapsModule {
        MapsModule::new(vec![
            MapSpec { name: "town".into(), offset: 0x100, width: 4, height: 2 },
            MapSpec { name: "cave".into(), offset: 0x200, width: 2, height: 2 },
        ])
    }

    fn rom() -> RomImage {
        let mut rom = RomImage::new(0x400);
        rom.write(0x100, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        rom.write(0x200, &[9, 9, 9, 9]).unwrap();
        rom
    }

    #[test]
    fn reads_maps_in_layout_order() {
        let Resource::Maps(maps) = module().read_from_rom(&rom()).unwrap() else {
            panic!("expected maps");
        };
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].name, "town");
        assert_eq!(maps[0].row(1), [5, 6, 7, 8]);
    }

    #[test]
    fn only_changed_bytes_are_written() {
        let m = module();
        let mut rom = rom();
        let Resource::Maps(mut maps) = m.read_from_rom(&rom).unwrap() else {
            panic!("expected maps");
        };
        maps[1].tiles[3] = 0x42;
        m.write_to_rom(&mut rom, &Resource::Maps(maps)).unwrap();

        let mut expected = self::rom();
        expected.write_u8(0x203, 0x42).unwrap();
        assert_eq!(rom.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn project_roundtrip_uses_hex_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test").unwrap();
        let m = module();
        let resource = m.read_from_rom(&rom()).unwrap();
        m.write_to_project(&mut project, &resource).unwrap();

        let text = std::fs::read_to_string(dir.path().join("maps/town.toml")).unwrap();
        assert!(text.contains("01020304"), "{text}");
        assert_eq!(m.read_from_project(&project).unwrap(), resource);
    }

    #[test]
    fn malformed_rows_are_resource_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test").unwrap();
        let m = module();
        m.write_to_project(&mut project, &m.read_from_rom(&rom()).unwrap()).unwrap();

        project
            .write_resource(MAPS_MODULE, "cave", "maps/cave.toml", b"width = 2\nheight = 2\nrows = [\"0909\", \"0Z09\"]\n")
            .unwrap();
        let err = m.read_from_project(&project).unwrap_err();
        assert!(matches!(err, ModuleError::Resource { ref resource, .. } if resource == "cave"));

        project
            .write_resource(MAPS_MODULE, "cave", "maps/cave.toml", b"width = 3\nheight = 2\nrows = []\n")
            .unwrap();
        assert!(m.read_from_project(&project).is_err());
    }

    #[test]
    fn raw_bytes_are_checked() {
        let m = module();
        assert_eq!(m.map_from_raw("cave", vec![1, 2, 3, 4]).unwrap().height, 2);
        assert!(m.map_from_raw("cave", vec![1, 2, 3]).is_err());
        assert!(m.map_from_raw("nowhere", vec![]).is_err());
    }
}
