//! Dialogue strings behind pointer tables.
//!
//! Printable ASCII (other than the bracket characters) is stored in the ROM
//! as `c + 0x30`. Every other byte is written in a hex bracket group; runs
//! of such bytes share one group, so `[0A 01 00]` is three bytes.

use romkit_project::Project;
use romkit_rom::RomImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ModuleError, ModuleResult};
use crate::layout::TextTableSpec;
use crate::pointer::{read_pointer, release_regions, PointerUpdate, Region};
use crate::resource::{Resource, TextTable};
use crate::traits::Module;

pub const TEXT_MODULE: &str = "text";

const CHAR_OFFSET: u8 = 0x30;

pub fn text_file_path(table: &str) -> String {
    format!("text/{table}.toml")
}

fn char_for(byte: u8) -> Option<char> {
    let c = byte.checked_sub(CHAR_OFFSET)?;
    ((0x20..=0x7E).contains(&c) && c != b'[' && c != b']').then_some(char::from(c))
}

/// Render ROM string bytes as editable text.
pub fn encode_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut in_group = false;
    for &b in bytes {
        match char_for(b) {
            Some(c) => {
                if in_group {
                    out.push(']');
                    in_group = false;
                }
                out.push(c);
            }
            None => {
                out.push(if in_group { ' ' } else { '[' });
                out.push_str(&format!("{b:02X}"));
                in_group = true;
            }
        }
    }
    if in_group {
        out.push(']');
    }
    out
}

/// Parse editable text back into ROM string bytes.
pub fn parse_text(text: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.char_indices();
    while let Some((pos, c)) = chars.next() {
        match c {
            '[' => {
                let rest = &text[pos + 1..];
                let close = rest
                    .find(']')
                    .ok_or_else(|| format!("unclosed '[' at column {pos}"))?;
                let group = &rest[..close];
                let mut any = false;
                for token in group.split_whitespace() {
                    if token.len() != 2 {
                        return Err(format!("bad byte {token:?} in group at column {pos}"));
                    }
                    let byte = u8::from_str_radix(token, 16)
                        .map_err(|_| format!("bad byte {token:?} in group at column {pos}"))?;
                    out.push(byte);
                    any = true;
                }
                if !any {
                    return Err(format!("empty byte group at column {pos}"));
                }
                // Skip the group body and the closing bracket.
                for _ in 0..=group.chars().count() {
                    chars.next();
                }
            }
            ']' => return Err(format!("unmatched ']' at column {pos}")),
            c if (' '..='~').contains(&c) => out.push(c as u8 + CHAR_OFFSET),
            c => return Err(format!("character {c:?} at column {pos} has no encoding")),
        }
    }
    Ok(out)
}

#[derive(Debug, Serialize, Deserialize)]
struct TextEntry {
    index: usize,
    text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TextFile {
    #[serde(default)]
    entries: Vec<TextEntry>,
}

struct StoredString {
    offset: usize,
    /// Bytes occupied, terminator included.
    stored_len: usize,
    bytes: Vec<u8>,
}

impl StoredString {
    fn region(&self) -> Region {
        (self.offset, self.offset + self.stored_len)
    }
}

struct TablePlan<'a> {
    spec: &'a TextTableSpec,
    table: &'a TextTable,
    changed: Vec<usize>,
}

/// Pointer tables of terminated strings.
pub struct TextModule {
    tables: Vec<TextTableSpec>,
}

impl TextModule {
    pub fn new(tables: Vec<TextTableSpec>) -> Self {
        Self { tables }
    }

    fn entry_id(table: &str, index: usize) -> String {
        format!("{table}/{index:03}")
    }

    fn read_table(&self, rom: &RomImage, spec: &TextTableSpec) -> ModuleResult<Vec<StoredString>> {
        let pointers = spec.pointers();
        (0..spec.count)
            .map(|i| {
                let id = Self::entry_id(&spec.name, i);
                let offset = read_pointer(rom, pointers.pointer_offset(i))
                    .map_err(|e| ModuleError::resource(TEXT_MODULE, &id, e))?;
                let tail = rom.tail(offset).map_err(|e| ModuleError::resource(TEXT_MODULE, &id, e))?;
                let len = tail
                    .iter()
                    .position(|&b| b == spec.terminator)
                    .ok_or_else(|| ModuleError::resource(TEXT_MODULE, &id, "string has no terminator"))?;
                Ok(StoredString {
                    offset,
                    stored_len: len + 1,
                    bytes: tail[..len].to_vec(),
                })
            })
            .collect()
    }

    fn spec_for(&self, name: &str) -> ModuleResult<&TextTableSpec> {
        self.tables
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ModuleError::resource(TEXT_MODULE, name, "table is not in the layout"))
    }

    fn check_table(spec: &TextTableSpec, table: &TextTable) -> ModuleResult<()> {
        if table.entries.len() != spec.count {
            return Err(ModuleError::resource(
                TEXT_MODULE,
                &spec.name,
                format!("expected {} strings, found {}", spec.count, table.entries.len()),
            ));
        }
        if let Some(i) = table.entries.iter().position(|e| e.contains(&spec.terminator)) {
            return Err(ModuleError::resource(
                TEXT_MODULE,
                &Self::entry_id(&spec.name, i),
                format!("string contains the terminator byte {:02X}", spec.terminator),
            ));
        }
        Ok(())
    }

    fn relocate(&self, rom: &mut RomImage, plan: &TablePlan<'_>) -> ModuleResult<Vec<PointerUpdate>> {
        let spec = plan.spec;
        let pointers = spec.pointers();
        let mut updates = Vec::with_capacity(plan.changed.len());
        for &i in &plan.changed {
            let mut bytes = plan.table.entries[i].clone();
            bytes.push(spec.terminator);
            let offset = rom.allocate(bytes.len())?;
            rom.write(offset, &bytes)?;
            debug!(entry = %Self::entry_id(&spec.name, i), offset, len = bytes.len(), "relocated string");
            updates.push(PointerUpdate {
                pointer_offset: pointers.pointer_offset(i),
                target_offset: offset,
                resource_id: Self::entry_id(&spec.name, i),
            });
        }
        Ok(updates)
    }

    fn parse_file(&self, spec: &TextTableSpec, file: TextFile) -> ModuleResult<TextTable> {
        let mut entries: Vec<Option<Vec<u8>>> = vec![None; spec.count];
        for entry in file.entries {
            let id = Self::entry_id(&spec.name, entry.index);
            let slot = entries
                .get_mut(entry.index)
                .ok_or_else(|| ModuleError::resource(TEXT_MODULE, &id, "index is past the end of the table"))?;
            if slot.is_some() {
                return Err(ModuleError::resource(TEXT_MODULE, &id, "index appears twice"));
            }
            let bytes = parse_text(&entry.text).map_err(|e| ModuleError::resource(TEXT_MODULE, &id, e))?;
            if bytes.contains(&spec.terminator) {
                return Err(ModuleError::resource(
                    TEXT_MODULE,
                    &id,
                    format!("text contains the terminator byte {:02X}", spec.terminator),
                ));
            }
            *slot = Some(bytes);
        }
        let entries = entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                e.ok_or_else(|| ModuleError::resource(TEXT_MODULE, &Self::entry_id(&spec.name, i), "entry is missing"))
            })
            .collect::<ModuleResult<Vec<_>>>()?;
        Ok(TextTable {
            name: spec.name.clone(),
            entries,
        })
    }

    fn as_tables<'r>(&self, resource: &'r Resource) -> ModuleResult<&'r [TextTable]> {
        match resource {
            Resource::Text(tables) => Ok(tables),
            other => Err(ModuleError::WrongResource {
                module: TEXT_MODULE,
                found: other.kind(),
            }),
        }
    }
}

impl Module for TextModule {
    fn id(&self) -> &'static str {
        TEXT_MODULE
    }

    fn description(&self) -> &'static str {
        "dialogue strings behind pointer tables"
    }

    fn read_from_rom(&self, rom: &RomImage) -> ModuleResult<Resource> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for spec in &self.tables {
            let entries = self.read_table(rom, spec)?.into_iter().map(|s| s.bytes).collect();
            tables.push(TextTable {
                name: spec.name.clone(),
                entries,
            });
        }
        Ok(Resource::Text(tables))
    }

    fn write_to_rom(&self, rom: &mut RomImage, resource: &Resource) -> ModuleResult<Vec<PointerUpdate>> {
        let tables = self.as_tables(resource)?;
        for table in tables {
            Self::check_table(self.spec_for(&table.name)?, table)?;
        }

        let mut plans = Vec::new();
        let mut released: Vec<Region> = Vec::new();
        let mut kept: Vec<Region> = Vec::new();
        for spec in &self.tables {
            let stored = self.read_table(rom, spec)?;
            let Some(table) = tables.iter().find(|t| t.name == spec.name) else {
                kept.extend(stored.iter().map(StoredString::region));
                continue;
            };
            let mut changed = Vec::new();
            for (i, string) in stored.iter().enumerate() {
                if string.bytes == table.entries[i] {
                    kept.push(string.region());
                } else {
                    released.push(string.region());
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

        // Shared suffixes, within or across tables, survive while referenced.
        let freed = release_regions(rom, released, &kept)?;
        let mut updates = Vec::new();
        for plan in &plans {
            updates.extend(self.relocate(rom, plan)?);
        }
        info!(tables = plans.len(), relocated = updates.len(), freed, "wrote text tables");
        Ok(updates)
    }

    fn stored_regions(&self, rom: &RomImage) -> ModuleResult<Vec<Region>> {
        let mut regions = Vec::new();
        for spec in &self.tables {
            regions.extend(self.read_table(rom, spec)?.iter().map(StoredString::region));
        }
        Ok(regions)
    }

    fn read_from_project(&self, project: &Project) -> ModuleResult<Resource> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for spec in &self.tables {
            let file: TextFile = project
                .read_resource_toml(TEXT_MODULE, &spec.name)
                .map_err(|e| ModuleError::resource(TEXT_MODULE, &spec.name, e))?;
            tables.push(self.parse_file(spec, file)?);
        }
        Ok(Resource::Text(tables))
    }

    fn write_to_project(&self, project: &mut Project, resource: &Resource) -> ModuleResult<()> {
        for table in self.as_tables(resource)? {
            let file = TextFile {
                entries: table
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(index, bytes)| TextEntry {
                        index,
                        text: encode_text(bytes),
                    })
                    .collect(),
            };
            project.write_resource_toml(TEXT_MODULE, &table.name, &text_file_path(&table.name), &file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use romkit_rom::to_snes_address;

    /// ROM bytes for a printable ASCII string.
    fn rom_text(s: &str) -> Vec<u8> {
        s.bytes().map(|b| b + CHAR_OFFSET).collect()
    }

    #[test]
    fn encodes_printable_and_groups_others() {
        let mut bytes = rom_text("Hi!");
        bytes.extend_from_slice(&[0x0A, 0x01, 0x00]);
        bytes.extend(rom_text(" ok"));
        bytes.push(0x02);
        assert_eq!(encode_text(&bytes), "Hi![0A 01 00] ok[02]");
        assert_eq!(parse_text("Hi![0A 01 00] ok[02]").unwrap(), bytes);
    }

    #[test]
    fn brackets_are_escaped() {
        let bytes = rom_text("a[b]");
        let text = encode_text(&bytes);
        assert_eq!(text, "a[8B]b[8D]");
        assert_eq!(parse_text(&text).unwrap(), bytes);
    }

    #[test]
    fn parse_accepts_loose_group_spacing() {
        assert_eq!(parse_text("[ 0a  ff ]A").unwrap(), [0x0A, 0xFF, b'A' + CHAR_OFFSET]);
    }

    #[test]
    fn parse_errors() {
        for bad in ["[0A", "A]", "[]", "[0G]", "[123]", "tab\there", "\u{e9}"] {
            assert!(parse_text(bad).is_err(), "{bad:?} parsed");
        }
    }

    #[test]
    fn every_byte_roundtrips() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(parse_text(&encode_text(&all)).unwrap(), all);
    }

    const TABLE: usize = 0x100;

    fn spec() -> TextTableSpec {
        TextTableSpec { name: "dialogue".into(), table_offset: TABLE, count: 3, terminator: 0x00 }
    }

    /// Strings "HELLO", "WORLD" and "LD" (a suffix of "WORLD").
    fn rom() -> RomImage {
        let mut rom = RomImage::new(0x1000);
        rom.write(0x200, &rom_text("HELLO")).unwrap();
        rom.write(0x210, &rom_text("WORLD")).unwrap();
        for (i, target) in [0x200, 0x210, 0x213].into_iter().enumerate() {
            rom.write_u24(TABLE + 3 * i, to_snes_address(target).unwrap()).unwrap();
        }
        rom.free(0x800, 0x100).unwrap();
        rom
    }

    fn tables(resource: Resource) -> Vec<TextTable> {
        match resource {
            Resource::Text(t) => t,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reads_strings_up_to_terminator() {
        let t = tables(TextModule::new(vec![spec()]).read_from_rom(&rom()).unwrap());
        assert_eq!(t[0].entries, [rom_text("HELLO"), rom_text("WORLD"), rom_text("LD")]);
    }

    #[test]
    fn relocation_rewrites_pointer_and_keeps_shared_suffix() {
        let m = TextModule::new(vec![spec()]);
        let mut rom = rom();
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        t[0].entries[1] = rom_text("EVERYONE");

        let updates = m.write_to_rom(&mut rom, &Resource::Text(t)).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].pointer_offset, TABLE + 3);
        for u in &updates {
            u.apply(&mut rom).unwrap();
        }

        // "WOR" was released; "LD\0" is still used by entry 2.
        let free: Vec<_> = rom.free_space().blocks().iter().map(|b| (b.start, b.len)).collect();
        assert!(free.contains(&(0x210, 3)), "{free:?}");

        let t = tables(m.read_from_rom(&rom).unwrap());
        assert_eq!(t[0].entries, [rom_text("HELLO"), rom_text("EVERYONE"), rom_text("LD")]);
    }

    #[test]
    fn suffix_used_by_another_table_survives() {
        let mut rom = rom();
        rom.write_u24(0x180, to_snes_address(0x213).unwrap()).unwrap();
        let names = TextTableSpec { name: "names".into(), table_offset: 0x180, count: 1, terminator: 0x00 };
        let m = TextModule::new(vec![spec(), names]);
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        t[0].entries[1] = rom_text("EVERYONE");
        t[0].entries[2] = rom_text("ALL");

        let updates = m.write_to_rom(&mut rom, &Resource::Text(t)).unwrap();
        assert_eq!(updates.len(), 2);
        assert!(!rom.free_space().overlaps(0x213, 3));
        assert!(rom.free_space().overlaps(0x210, 3));

        for u in &updates {
            u.apply(&mut rom).unwrap();
        }
        let t = tables(m.read_from_rom(&rom).unwrap());
        assert_eq!(t[1].entries, [rom_text("LD")]);
        assert_eq!(m.stored_regions(&rom).unwrap().len(), 4);
    }

    #[test]
    fn terminator_inside_string_is_rejected() {
        let m = TextModule::new(vec![spec()]);
        let mut rom = rom();
        let mut t = tables(m.read_from_rom(&rom).unwrap());
        t[0].entries[0] = vec![0x60, 0x00, 0x60];
        assert!(matches!(
            m.write_to_rom(&mut rom, &Resource::Text(t)),
            Err(ModuleError::Resource { .. })
        ));
    }

    #[test]
    fn project_roundtrip_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test").unwrap();
        let m = TextModule::new(vec![spec()]);
        let resource = m.read_from_rom(&rom()).unwrap();
        m.write_to_project(&mut project, &resource).unwrap();

        let text = std::fs::read_to_string(dir.path().join("text/dialogue.toml")).unwrap();
        assert!(text.contains("HELLO"), "{text}");
        assert_eq!(m.read_from_project(&project).unwrap(), resource);

        let broken = "[[entries]]\nindex = 0\ntext = \"A[00]\"\n";
        project
            .write_resource(TEXT_MODULE, "dialogue", "text/dialogue.toml", broken.as_bytes())
            .unwrap();
        assert!(m.read_from_project(&project).is_err());

        let missing = "[[entries]]\nindex = 0\ntext = \"A\"\n[[entries]]\nindex = 2\ntext = \"B\"\n";
        project
            .write_resource(TEXT_MODULE, "dialogue", "text/dialogue.toml", missing.as_bytes())
            .unwrap();
        let err = m.read_from_project(&project).unwrap_err();
        assert!(matches!(err, ModuleError::Resource { ref resource, .. } if resource == "dialogue/001"));
    }
}
