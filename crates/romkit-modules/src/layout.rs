//! Where a ROM type keeps its resources.
//!
//! Layouts are plain TOML so new cartridge revisions can be described
//! without rebuilding:
//!
//! ```toml
//! name = "demo"
//! size = 0x20000
//! expansions = [0x40000]
//!
//! [[free_ranges]]
//! offset = 0x18000
//! length = 0x8000
//!
//! [title]
//! offset = 0xFFC0
//! length = 21
//!
//! [[maps]]
//! name = "town"
//! offset = 0x10000
//! width = 16
//! height = 8
//!
//! [[text_tables]]
//! name = "dialogue"
//! table_offset = 0x11000
//! count = 4
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModuleError, ModuleResult};

/// Headerless size of the stock cartridge.
pub const DEFAULT_ROM_SIZE: usize = 0x30_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeRange {
    pub offset: usize,
    pub length: usize,
}

/// Fixed-size internal title field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleField {
    pub offset: usize,
    pub length: usize,
}

impl Default for TitleField {
    fn default() -> Self {
        Self {
            offset: 0xFFC0,
            length: 21,
        }
    }
}

/// A tile map stored uncompressed at a fixed offset, one byte per tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSpec {
    pub name: String,
    pub offset: usize,
    pub width: usize,
    pub height: usize,
}

impl MapSpec {
    pub fn byte_len(&self) -> usize {
        self.width * self.height
    }
}

/// A table of `count` 3-byte pointers starting at `table_offset`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub table_offset: usize,
    pub count: usize,
}

impl TableSpec {
    /// Offset of the pointer for entry `index`.
    pub fn pointer_offset(&self, index: usize) -> usize {
        self.table_offset + 3 * index
    }
}

fn default_terminator() -> u8 {
    0x00
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTableSpec {
    pub name: String,
    pub table_offset: usize,
    pub count: usize,
    /// Byte ending each string.
    #[serde(default = "default_terminator")]
    pub terminator: u8,
}

impl TextTableSpec {
    pub fn pointers(&self) -> TableSpec {
        TableSpec {
            name: self.name.clone(),
            table_offset: self.table_offset,
            count: self.count,
        }
    }
}

/// Description of one ROM type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RomLayout {
    pub name: String,
    /// Headerless size of an unexpanded image.
    pub size: usize,
    /// Sizes the image may be expanded to, ascending.
    pub expansions: Vec<usize>,
    /// Regions known to be unused in the stock image.
    pub free_ranges: Vec<FreeRange>,
    pub title: Option<TitleField>,
    pub maps: Vec<MapSpec>,
    pub compressed_tables: Vec<TableSpec>,
    pub text_tables: Vec<TextTableSpec>,
}

impl Default for RomLayout {
    fn default() -> Self {
        Self {
            name: "EarthBound".into(),
            size: DEFAULT_ROM_SIZE,
            expansions: vec![0x40_0000, 0x60_0000],
            free_ranges: Vec::new(),
            title: Some(TitleField::default()),
            maps: Vec::new(),
            compressed_tables: Vec::new(),
            text_tables: Vec::new(),
        }
    }
}

impl RomLayout {
    pub fn from_toml(text: &str, path: &Path) -> ModuleResult<Self> {
        let layout: Self = toml::from_str(text).map_err(|source| ModuleError::LayoutParse {
            path: path.to_path_buf(),
            source,
        })?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: &Path) -> ModuleResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    pub fn to_toml(&self) -> ModuleResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Headerless sizes a loaded image may have.
    pub fn accepted_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.size];
        sizes.extend(self.expansions.iter().copied());
        sizes
    }

    /// Largest size the image can ever reach.
    pub fn max_size(&self) -> usize {
        self.accepted_sizes().into_iter().max().unwrap_or(self.size)
    }

    /// End of `[offset, offset + len)`, rejecting overflow and regions past
    /// the base image.
    fn region_end(&self, what: &str, offset: usize, len: Option<usize>) -> ModuleResult<usize> {
        let end = len
            .and_then(|len| offset.checked_add(len))
            .ok_or_else(|| ModuleError::Layout(format!("{what} at {offset:#x} has an impossible size")))?;
        if end > self.size {
            return Err(ModuleError::Layout(format!(
                "{what} ends at {end:#x}, past the base image ({:#x})",
                self.size
            )));
        }
        Ok(end)
    }

    /// Regions the modules read and write in place: the title field, maps
    /// and pointer tables.
    fn fixed_regions(&self) -> ModuleResult<Vec<(String, usize, usize)>> {
        let mut regions = Vec::new();
        if let Some(t) = &self.title {
            let end = self.region_end("title field", t.offset, Some(t.length))?;
            regions.push(("title field".to_string(), t.offset, end));
        }
        for m in &self.maps {
            let what = format!("map {}", m.name);
            let len = m.width.checked_mul(m.height);
            if len == Some(0) {
                return Err(ModuleError::Layout(format!("{what} has no tiles")));
            }
            let end = self.region_end(&what, m.offset, len)?;
            regions.push((what, m.offset, end));
        }
        for t in &self.compressed_tables {
            let what = format!("compressed table {}", t.name);
            let end = self.region_end(&what, t.table_offset, t.count.checked_mul(3))?;
            regions.push((what, t.table_offset, end));
        }
        for t in &self.text_tables {
            let what = format!("text table {}", t.name);
            let end = self.region_end(&what, t.table_offset, t.count.checked_mul(3))?;
            regions.push((what, t.table_offset, end));
        }
        Ok(regions)
    }

    /// Reject layouts with duplicate names, regions past the image end, or
    /// free ranges that overlap each other or a fixed region.
    ///
    /// Pointer tables may share relocatable storage within one module; data
    /// shared between the compressed and text modules is not tracked.
    pub fn validate(&self) -> ModuleResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModuleError::Layout("layout has no name".into()));
        }
        if self.size == 0 {
            return Err(ModuleError::Layout("size must be non-zero".into()));
        }
        if let Some(bad) = self.expansions.iter().find(|&&s| s <= self.size) {
            return Err(ModuleError::Layout(format!(
                "expansion size {bad:#x} is not larger than base size {:#x}",
                self.size
            )));
        }

        let mut names = HashSet::new();
        for m in &self.maps {
            if !names.insert(("maps", m.name.as_str())) {
                return Err(ModuleError::Layout(format!("duplicate map {}", m.name)));
            }
        }
        for t in &self.compressed_tables {
            if !names.insert(("compressed", t.name.as_str())) {
                return Err(ModuleError::Layout(format!("duplicate compressed table {}", t.name)));
            }
        }
        for t in &self.text_tables {
            if !names.insert(("text", t.name.as_str())) {
                return Err(ModuleError::Layout(format!("duplicate text table {}", t.name)));
            }
        }

        let fixed = self.fixed_regions()?;
        let mut free = Vec::with_capacity(self.free_ranges.len());
        for r in &self.free_ranges {
            if r.length == 0 {
                return Err(ModuleError::Layout(format!("empty free range at {:#x}", r.offset)));
            }
            let end = self.region_end("free range", r.offset, Some(r.length))?;
            if let Some((what, ..)) = fixed.iter().find(|&&(_, s, e)| s < end && r.offset < e) {
                return Err(ModuleError::Layout(format!(
                    "free range {:#x}..{end:#x} overlaps the {what}",
                    r.offset
                )));
            }
            free.push((r.offset, end));
        }
        free.sort_unstable();
        if let Some(w) = free.windows(2).find(|w| w[1].0 < w[0].1) {
            return Err(ModuleError::Layout(format!(
                "free ranges {:#x}..{:#x} and {:#x}..{:#x} overlap",
                w[0].0, w[0].1, w[1].0, w[1].1
            )));
        }
        Ok(())
    }
}
