use serde::{Deserialize, Serialize};

/// The cartridge's internal title, trailing padding removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomTitle {
    pub title: String,
}

/// A fixed-size tile map, row-major, one byte per tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileMap {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<u8>,
}

impl TileMap {
    pub fn row(&self, y: usize) -> &[u8] {
        &self.tiles[y * self.width..(y + 1) * self.width]
    }
}

/// Decompressed contents of every entry of one compressed pointer table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobTable {
    pub name: String,
    pub entries: Vec<Vec<u8>>,
}

/// Raw string bytes of one text pointer table, terminators excluded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextTable {
    pub name: String,
    pub entries: Vec<Vec<u8>>,
}

/// Structured value produced and consumed by one module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Title(RomTitle),
    Maps(Vec<TileMap>),
    Compressed(Vec<BlobTable>),
    Text(Vec<TextTable>),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Maps(_) => "maps",
            Self::Compressed(_) => "compressed",
            Self::Text(_) => "text",
        }
    }

    /// Number of individually stored items (one file each in a project,
    /// except text, which stores one file per table).
    pub fn item_count(&self) -> usize {
        match self {
            Self::Title(_) => 1,
            Self::Maps(maps) => maps.len(),
            Self::Compressed(tables) => tables.iter().map(|t| t.entries.len()).sum(),
            Self::Text(tables) => tables.iter().map(|t| t.entries.len()).sum(),
        }
    }
}
