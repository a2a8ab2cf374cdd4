use romkit_codec::{compress, decompress_block};
use romkit_project::Project;
use romkit_rom::RomImage;
use tracing::{debug, info};

use crate::error::{ModuleError, ModuleResult};
use crate::layout::TableSpec;
use crate::pointer::{read_pointer, release_regions, PointerUpdate, Region};
use crate::resource::{BlobTable, Resource};
use crate::traits::Module;

pub const COMPRESSED_MODULE: &str = "compressed";

/// Resource id of one entry, also its project path stem.
pub fn entry_id(table: &str, index: usize) -> String {
    format!("{table}/{index:03}")
}

fn entry_path(table: &str, index: usize) -> String {
    format!("compressed/{}.bin", entry_id(table, index))
}

/// One decoded entry as it currently sits in the ROM.
struct StoredEntry {
    offset: usize,
    compressed_len: usize,
    data: Vec<u8>,
}

impl StoredEntry {
    fn region(&self) -> Region {
        (self.offset, self.offset + self.compressed_len)
    }
}

/// Entries of one table whose project value differs from the ROM.
struct TablePlan<'a> {
    spec: &'a TableSpec,
    table: &'a BlobTable,
    changed: Vec<usize>,
}

/// Pointer tables of codec-compressed blocks.
pub struct CompressedModule {
    tables: Vec<TableSpec>,
}

impl CompressedModule {
    pub fn new(tables: Vec<TableSpec>) -> Self {
        Self { tables }
    }

    fn read_table(&self, rom: &RomImage, spec: &TableSpec) -> ModuleResult<Vec<StoredEntry>> {
        (0..spec.count)
            .map(|i| {
                let id = entry_id(&spec.name, i);
                let offset = read_pointer(rom, spec.pointer_offset(i))
                    .map_err(|e| ModuleError::resource(COMPRESSED_MODULE, &id, e))?;
                let decoded = decompress_block(rom.as_bytes(), offset, None)
                    .map_err(|e| ModuleError::resource(COMPRESSED_MODULE, &id, e))?;
                Ok(StoredEntry {
                    offset,
                    compressed_len: decoded.block.compressed_len,
                    data: decoded.data,
                })
            })
            .collect()
    }

    fn spec_for(&self, name: &str) -> ModuleResult<&TableSpec> {
        self.tables
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ModuleError::resource(COMPRESSED_MODULE, name, "table is not in the layout"))
    }

    fn relocate(&self, rom: &mut RomImage, plan: &TablePlan<'_>) -> ModuleResult<Vec<PointerUpdate>> {
        let spec = plan.spec;
        let mut updates = Vec::with_capacity(plan.changed.len());
        for &i in &plan.changed {
            let data = &plan.table.entries[i];
            let packed = compress(data);
            let offset = rom.allocate(packed.len())?;
            rom.write(offset, &packed)?;
            debug!(
                entry = %entry_id(&spec.name, i),
                offset,
                raw = data.len(),
                packed = packed.len(),
                "relocated compressed entry"
            );
            updates.push(PointerUpdate {
                pointer_offset: spec.pointer_offset(i),
                target_offset: offset,
                resource_id: entry_id(&spec.name, i),
            });
        }
        Ok(updates)
    }

    fn as_tables<'r>(&self, resource: &'r Resource) -> ModuleResult<&'r [BlobTable]> {
        match resource {
            Resource::Compressed(tables) => Ok(tables),
            other => Err(ModuleError::WrongResource {
                module: COMPRESSED_MODULE,
                found: other.kind(),
            }),
        }
    }
}

impl Module for CompressedModule {
    fn id(&self) -> &'static str {
        COMPRESSED_MODULE
    }

    fn description(&self) -> &'static str {
        "compressed data blocks behind pointer tables"
    }

    fn read_from_rom(&self, rom: &RomImage) -> ModuleResult<Resource> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for spec in &self.tables {
            let entries = self.read_table(rom, spec)?.into_iter().map(|e| e.data).collect();
            tables.push(BlobTable {
                name: spec.name.clone(),
                entries,
            });
        }
        Ok(Resource::Compressed(tables))
    }

    fn write_to_rom(&self, rom: &mut RomImage, resource: &Resource) -> ModuleResult<Vec<PointerUpdate>> {
        let tables = self.as_tables(resource)?;
        for table in tables {
            let spec = self.spec_for(&table.name)?;
            if table.entries.len() != spec.count {
                return Err(ModuleError::resource(
                    COMPRESSED_MODULE,
                    &spec.name,
                    format!("expected {} entries, found {}", spec.count, table.entries.len()),
                ));
            }
        }

        let mut plans = Vec::new();
        let mut released: Vec<Region> = Vec::new();
        let mut kept: Vec<Region> = Vec::new();
        for spec in &self.tables {
            let stored = self.read_table(rom, spec)?;
            let Some(table) = tables.iter().find(|t| t.name == spec.name) else {
                kept.extend(stored.iter().map(StoredEntry::region));
                continue;
            };
            let mut changed = Vec::new();
            for (i, entry) in stored.iter().enumerate() {
                if entry.data == table.entries[i] {
                    kept.push(entry.region());
                } else {
                    released.push(entry.region());
                    changed.push(i);
                }
            }
            if !changed.is_empty() {
                plans.push(TablePlan { spec, table, changed });
            }
        }
        if plans.is_empty() {
            return Ok(Vec::new());
        }

        // Bytes still referenced by an unchanged entry of any table stay put.
        let freed = release_regions(rom, released, &kept)?;
        let mut updates = Vec::new();
        for plan in &plans {
            updates.extend(self.relocate(rom, plan)?);
        }
        info!(tables = plans.len(), relocated = updates.len(), freed, "wrote compressed tables");
        Ok(updates)
    }

    fn stored_regions(&self, rom: &RomImage) -> ModuleResult<Vec<Region>> {
        let mut regions = Vec::new();
        for spec in &self.tables {
            regions.extend(self.read_table(rom, spec)?.iter().map(StoredEntry::region));
        }
        Ok(regions)
    }

    fn read_from_project(&self, project: &Project) -> ModuleResult<Resource> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for spec in &self.tables {
            let entries = (0..spec.count)
                .map(|i| {
                    let id = entry_id(&spec.name, i);
                    project
                        .read_resource(COMPRESSED_MODULE, &id)
                        .map_err(|e| ModuleError::resource(COMPRESSED_MODULE, &id, e))
                })
                .collect::<ModuleResult<Vec<_>>>()?;
            tables.push(BlobTable {
                name: spec.name.clone(),
                entries,
            });
        }
        Ok(Resource::Compressed(tables))
    }

    fn write_to_project(&self, project: &mut Project, resource: &Resource) -> ModuleResult<()> {
        for table in self.as_tables(resource)? {
            for (i, data) in table.entries.iter().enumerate() {
                project.write_resource(
                    COMPRESSED_MODULE,
                    &entry_id(&table.name, i),
                    &entry_path(&table.name, i),
                    data,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use romkit_codec::decompress;
    use romkit_rom::{to_snes_address, RomError};

    const TABLE: usize = 0x100;

    fn spec() -> TableSpec {
        TableSpec { name: "gfx".into(), table_offset: TABLE, count: 3 }
    }

    /// Entries 0 and 2 share one block at 0x200; entry 1 lives at 0x300.
    fn rom() -> RomImage {
        let mut rom = RomImage::new(0x1000);
        let shared = compress(&[7; 40]);
        let single = compress(b"single entry");
        rom.write(0x200, &shared).unwrap();
        rom.write(0x300, &single).unwrap();
        for (i, target) in [0x200, 0x300, 0x200].into_iter().enumerate() {
            rom.write_u24(TABLE + 3 * i, to_snes_address(target).unwrap()).unwrap();
        }
        rom.free(0x800, 0x800).unwrap();
        rom
    }

    fn tables(resource: Resource) -> Vec<BlobTable> {
        match resource {
            Resource::Compressed(t) => t,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reads_entries_through_pointers() {
        let t = tables(CompressedModule::new(vec![spec()]).read_from_rom(&rom()).unwrap());
        assert_eq!(t[0].entries[0], vec![7; 40]);
        assert_eq!(t[0].entries[1], b"single entry");
        assert_eq!(t[0].entries[2], t[0].entries[0]);
    }

    #[test]
    fn unchanged_tables_write_nothing() {
        let m = CompressedModule::new(vec![spec()]);
        let mut rom = rom();
        let before = rom.as_bytes().to_vec();
        let resource = m.read_from_rom(&rom).unwrap();
        assert!(m.write_to_rom(&mut rom, &resource).unwrap().is_empty());
        assert_eq!(rom.as_bytes(), before.as_slice());
    }

    #[test]
    fn changed_entry_is_relocated() {
        let m = CompressedModule::new(vec![spec()]);
        let mut rom = rom();
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        t[0].entries[1] = (0..200u8).collect();

        let updates = m.write_to_rom(&mut rom, &Resource::Compressed(t)).unwrap();
        assert_eq!(updates.len(), 1);
        let u = &updates[0];
        assert_eq!(u.pointer_offset, TABLE + 3);
        assert_eq!(u.resource_id, "gfx/001");

        let decoded = decompress(rom.tail(u.target_offset).unwrap()).unwrap();
        assert_eq!(decoded, (0..200u8).collect::<Vec<_>>());

        for u in &updates {
            u.apply(&mut rom).unwrap();
        }
        let t = tables(m.read_from_rom(&rom).unwrap());
        assert_eq!(t[0].entries[1], (0..200u8).collect::<Vec<_>>());
        assert_eq!(t[0].entries[0], vec![7; 40]);
    }

    #[test]
    fn shared_storage_is_not_released() {
        let m = CompressedModule::new(vec![spec()]);
        let mut rom = rom();
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        let free_before = rom.free_space().total();
        // Entry 0 moves, entry 2 still points at the shared block.
        t[0].entries[0] = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];
        let updates = m.write_to_rom(&mut rom, &Resource::Compressed(t)).unwrap();
        assert_eq!(updates.len(), 1);
        let packed = compress(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).len();
        assert_eq!(rom.free_space().total(), free_before - packed);
    }

    #[test]
    fn block_shared_across_tables_is_not_released() {
        // A second table points at the block entries 0 and 2 of `gfx` share.
        let mut rom = rom();
        rom.write_u24(0x180, to_snes_address(0x200).unwrap()).unwrap();
        let other = TableSpec { name: "alt".into(), table_offset: 0x180, count: 1 };
        let m = CompressedModule::new(vec![spec(), other]);
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        let free_before = rom.free_space().total();

        t[0].entries[0] = vec![9; 3];
        t[0].entries[2] = vec![9; 3];
        let updates = m.write_to_rom(&mut rom, &Resource::Compressed(t)).unwrap();
        assert_eq!(updates.len(), 2);
        assert!(!rom.free_space().overlaps(0x200, compress(&[7; 40]).len()));
        let packed = compress(&[9; 3]).len();
        assert_eq!(rom.free_space().total(), free_before - 2 * packed);

        for u in &updates {
            u.apply(&mut rom).unwrap();
        }
        let t = tables(m.read_from_rom(&rom).unwrap());
        assert_eq!(t[1].entries[0], vec![7; 40]);
    }

    #[test]
    fn stored_regions_cover_every_entry() {
        let m = CompressedModule::new(vec![spec()]);
        let rom = rom();
        let shared = compress(&[7; 40]).len();
        let single = compress(b"single entry").len();
        assert_eq!(
            m.stored_regions(&rom).unwrap(),
            [(0x200, 0x200 + shared), (0x300, 0x300 + single), (0x200, 0x200 + shared)]
        );
    }

    #[test]
    fn exhausted_space_is_reported() {
        let m = CompressedModule::new(vec![spec()]);
        let mut rom = rom();
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        // Incompressible and larger than any free block.
        let mut x = 0x2545_F491u32;
        t[0].entries[1] = (0..0x1000)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                (x >> 24) as u8
            })
            .collect();
        let err = m.write_to_rom(&mut rom, &Resource::Compressed(t)).unwrap_err();
        assert!(matches!(err, ModuleError::Rom(RomError::FreeSpaceExhausted { .. })));
    }

    #[test]
    fn entry_count_must_match() {
        let m = CompressedModule::new(vec![spec()]);
        let mut rom = rom();
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        t[0].entries.pop();
        assert!(matches!(
            m.write_to_rom(&mut rom, &Resource::Compressed(t)),
            Err(ModuleError::Resource { .. })
        ));
    }

    #[test]
    fn project_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test").unwrap();
        let m = CompressedModule::new(vec![spec()]);
        let resource = m.read_from_rom(&rom()).unwrap();
        m.write_to_project(&mut project, &resource).unwrap();
        assert!(dir.path().join("compressed/gfx/001.bin").is_file());
        assert_eq!(m.read_from_project(&project).unwrap(), resource);
    }

    #[test]
    fn missing_entry_file_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test").unwrap();
        let m = CompressedModule::new(vec![spec()]);
        m.write_to_project(&mut project, &m.read_from_rom(&rom()).unwrap()).unwrap();
        project.remove_file("compressed/gfx/002.bin").unwrap();
        let err = m.read_from_project(&project).unwrap_err();
        assert!(matches!(err, ModuleError::Resource { ref resource, .. } if resource == "gfx/002"));
    }
}
