use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProjectError, ProjectResult};

/// File name of the manifest at the project root.
pub const MANIFEST_FILE: &str = "project.toml";

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// One resource file tracked by the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub module_id: String,
    pub resource_id: String,
    /// Path relative to the project root, `/`-separated.
    pub file_path: String,
}

impl ResourceEntry {
    pub fn new(
        module_id: impl Into<String>,
        resource_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            resource_id: resource_id.into(),
            file_path: file_path.into(),
        }
    }

    fn same_resource(&self, other: &ResourceEntry) -> bool {
        self.module_id == other.module_id && self.resource_id == other.resource_id
    }
}

/// Contents of `project.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    /// Layout name the project was decompiled with.
    pub rom_type: String,
    /// BLAKE3 fingerprint of the base image, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_rom_hash: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            rom_type: String::new(),
            base_rom_hash: None,
            resources: Vec::new(),
        }
    }
}

impl Manifest {
    pub fn new(rom_type: impl Into<String>) -> Self {
        Self {
            rom_type: rom_type.into(),
            ..Default::default()
        }
    }

    pub fn find(&self, module_id: &str, resource_id: &str) -> Option<&ResourceEntry> {
        self.resources
            .iter()
            .find(|e| e.module_id == module_id && e.resource_id == resource_id)
    }

    /// Entries belonging to one module, in manifest order.
    pub fn entries_for<'a>(&'a self, module_id: &'a str) -> impl Iterator<Item = &'a ResourceEntry> {
        self.resources.iter().filter(move |e| e.module_id == module_id)
    }

    /// Insert `entry`, replacing any entry for the same module and resource.
    pub fn upsert(&mut self, entry: ResourceEntry) {
        match self.resources.iter_mut().find(|e| e.same_resource(&entry)) {
            Some(existing) => *existing = entry,
            None => self.resources.push(entry),
        }
    }

    /// Drop every entry of `module_id`. Returns how many were removed.
    pub fn remove_module(&mut self, module_id: &str) -> usize {
        let before = self.resources.len();
        self.resources.retain(|e| e.module_id != module_id);
        before - self.resources.len()
    }

    pub fn to_toml(&self) -> ProjectResult<String> {
        toml::to_string(self).map_err(|source| ProjectError::Serialize {
            what: MANIFEST_FILE.into(),
            source,
        })
    }

    /// Parse manifest text; `path` is only used for error reporting.
    pub fn from_toml(text: &str, path: &Path) -> ProjectResult<Self> {
        toml::from_str(text).map_err(|source| ProjectError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_current_schema() {
        let m = Manifest::default();
        assert_eq!(m.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(m.resources.is_empty());
    }

    #[test]
    fn toml_roundtrip() {
        let mut m = Manifest::new("test-cart");
        m.base_rom_hash = Some("ab".repeat(32));
        m.upsert(ResourceEntry::new("title", "title", "title.toml"));
        m.upsert(ResourceEntry::new("text", "dialogue", "text/dialogue.toml"));

        let text = m.to_toml().unwrap();
        assert!(text.contains("[[resources]]"));
        let back = Manifest::from_toml(&text, Path::new(MANIFEST_FILE)).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn hash_is_optional() {
        let text = "schema_version = 1\nrom_type = \"old\"\n";
        let m = Manifest::from_toml(text, Path::new(MANIFEST_FILE)).unwrap();
        assert_eq!(m.schema_version, 1);
        assert!(m.base_rom_hash.is_none());
        assert!(!m.to_toml().unwrap().contains("base_rom_hash"));
    }

    #[test]
    fn upsert_replaces_same_resource() {
        let mut m = Manifest::new("x");
        m.upsert(ResourceEntry::new("maps", "town", "maps/town.bin"));
        m.upsert(ResourceEntry::new("maps", "town", "maps/town.toml"));
        assert_eq!(m.resources.len(), 1);
        assert_eq!(m.find("maps", "town").unwrap().file_path, "maps/town.toml");
    }

    #[test]
    fn remove_module_keeps_others() {
        let mut m = Manifest::new("x");
        m.upsert(ResourceEntry::new("text", "a", "text/a.toml"));
        m.upsert(ResourceEntry::new("maps", "b", "maps/b.toml"));
        m.upsert(ResourceEntry::new("text", "c", "text/c.toml"));
        assert_eq!(m.remove_module("text"), 2);
        assert_eq!(m.entries_for("maps").count(), 1);
        assert_eq!(m.entries_for("text").count(), 0);
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let err = Manifest::from_toml("schema_version = \"three\"", Path::new("p.toml")).unwrap_err();
        assert!(matches!(err, ProjectError::Parse { .. }));
    }
}
