use std::path::PathBuf;

use romkit_modules::ModuleError;
use romkit_project::ProjectError;
use romkit_rom::RomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("another operation is already running")]
    AlreadyRunning,

    /// A module failed; carries the module id.
    #[error("module {module} failed: {source}")]
    Module {
        module: String,
        source: ModuleError,
    },

    #[error("project schema version {found} is newer than supported version {supported}")]
    ProjectVersion { found: u32, supported: u32 },

    #[error("no migration from project schema version {from}")]
    MissingMigration { from: u32 },

    #[error("project schema version {found} is out of date; run upgrade first")]
    NeedsUpgrade { found: u32 },

    #[error("layout error: {0}")]
    Layout(ModuleError),

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("background worker panicked")]
    WorkerPanicked,

    #[error("rom error: {0}")]
    Rom(#[from] RomError),

    #[error("project error: {0}")]
    Project(#[from] ProjectError),
}

impl CoreError {
    pub fn module(module: &str, source: impl Into<ModuleError>) -> Self {
        Self::Module {
            module: module.to_string(),
            source: source.into(),
        }
    }

    /// Module id of a module failure.
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::Module { module, .. } => Some(module),
            _ => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
