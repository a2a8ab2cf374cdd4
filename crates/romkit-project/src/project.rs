use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ProjectError, ProjectResult};
use crate::manifest::{Manifest, ResourceEntry, MANIFEST_FILE};

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ProjectResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| ProjectError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ProjectError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ProjectError::io(path, e))?;
    tmp.persist(path).map_err(|e| ProjectError::io(path, e.error))?;
    Ok(())
}

/// A project directory and its in-memory manifest.
///
/// Resource writes land on disk immediately; the manifest is only written
/// by [`Project::save`].
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    manifest: Manifest,
}

impl Project {
    /// Start a fresh project at `root`, creating the directory if needed.
    pub fn create(root: impl Into<PathBuf>, rom_type: &str) -> ProjectResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ProjectError::io(&root, e))?;
        Ok(Self {
            root,
            manifest: Manifest::new(rom_type),
        })
    }

    /// Open an existing project.
    pub fn open(root: impl Into<PathBuf>) -> ProjectResult<Self> {
        let root = root.into();
        let path = root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(ProjectError::ManifestMissing(path));
        }
        let text = fs::read_to_string(&path).map_err(|e| ProjectError::io(&path, e))?;
        let manifest = Manifest::from_toml(&text, &path)?;
        debug!(root = %root.display(), schema = manifest.schema_version, "opened project");
        Ok(Self { root, manifest })
    }

    /// Open the project at `root` if it has a manifest, else create one.
    pub fn open_or_create(root: impl Into<PathBuf>, rom_type: &str) -> ProjectResult<Self> {
        let root = root.into();
        if Self::exists(&root) {
            Self::open(root)
        } else {
            Self::create(root, rom_type)
        }
    }

    pub fn exists(root: &Path) -> bool {
        root.join(MANIFEST_FILE).is_file()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    /// Persist the manifest atomically.
    pub fn save(&self) -> ProjectResult<()> {
        let path = self.root.join(MANIFEST_FILE);
        write_atomic(&path, self.manifest.to_toml()?.as_bytes())?;
        info!(
            path = %path.display(),
            schema = self.manifest.schema_version,
            resources = self.manifest.resources.len(),
            "saved project manifest"
        );
        Ok(())
    }

    /// Resolve a manifest-relative path, rejecting anything that would
    /// escape the project root.
    pub fn resolve(&self, relative: &str) -> ProjectResult<PathBuf> {
        let rel = Path::new(relative);
        let safe = !relative.is_empty()
            && rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(ProjectError::UnsafePath(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Write a resource file and record it in the manifest.
    pub fn write_resource(
        &mut self,
        module_id: &str,
        resource_id: &str,
        file_path: &str,
        bytes: &[u8],
    ) -> ProjectResult<()> {
        let path = self.resolve(file_path)?;
        write_atomic(&path, bytes)?;
        debug!(module = module_id, resource = resource_id, path = file_path, len = bytes.len(), "wrote resource");
        self.manifest
            .upsert(ResourceEntry::new(module_id, resource_id, file_path));
        Ok(())
    }

    /// Serialize `value` as TOML and write it as a resource.
    pub fn write_resource_toml<T: Serialize>(
        &mut self,
        module_id: &str,
        resource_id: &str,
        file_path: &str,
        value: &T,
    ) -> ProjectResult<()> {
        let text = toml::to_string(value).map_err(|source| ProjectError::Serialize {
            what: file_path.to_string(),
            source,
        })?;
        self.write_resource(module_id, resource_id, file_path, text.as_bytes())
    }

    /// Manifest entry for a resource, or `UnknownResource`.
    pub fn entry(&self, module_id: &str, resource_id: &str) -> ProjectResult<&ResourceEntry> {
        self.manifest
            .find(module_id, resource_id)
            .ok_or_else(|| ProjectError::UnknownResource {
                module_id: module_id.to_string(),
                resource_id: resource_id.to_string(),
            })
    }

    pub fn read_resource(&self, module_id: &str, resource_id: &str) -> ProjectResult<Vec<u8>> {
        let entry = self.entry(module_id, resource_id)?;
        self.read_file(&entry.file_path)
    }

    pub fn read_resource_toml<T: DeserializeOwned>(
        &self,
        module_id: &str,
        resource_id: &str,
    ) -> ProjectResult<T> {
        let entry = self.entry(module_id, resource_id)?;
        let bytes = self.read_file(&entry.file_path)?;
        let path = self.resolve(&entry.file_path)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            ProjectError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        toml::from_str(&text).map_err(|source| ProjectError::Parse { path, source })
    }

    /// Read any file under the project root.
    pub fn read_file(&self, file_path: &str) -> ProjectResult<Vec<u8>> {
        let path = self.resolve(file_path)?;
        if !path.is_file() {
            return Err(ProjectError::ResourceFileMissing(path));
        }
        fs::read(&path).map_err(|e| ProjectError::io(&path, e))
    }

    /// Delete a file under the project root. Missing files are not an error.
    pub fn remove_file(&self, file_path: &str) -> ProjectResult<()> {
        let path = self.resolve(file_path)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProjectError::io(&path, e)),
        }
    }
}
