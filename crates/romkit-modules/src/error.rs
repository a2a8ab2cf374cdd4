use std::path::PathBuf;

use romkit_codec::CodecError;
use romkit_project::ProjectError;
use romkit_rom::RomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    /// Malformed or missing data for one resource.
    #[error("module {module}, resource {resource}: {reason}")]
    Resource {
        module: String,
        resource: String,
        reason: String,
    },

    #[error("module {module} was handed a {found} resource")]
    WrongResource {
        module: &'static str,
        found: &'static str,
    },

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("invalid layout: {0}")]
    Layout(String),

    #[error("failed to parse layout {path}: {source}")]
    LayoutParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize layout: {0}")]
    LayoutSerialize(#[from] toml::ser::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("rom error: {0}")]
    Rom(#[from] RomError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("project error: {0}")]
    Project(#[from] ProjectError),
}

impl ModuleError {
    pub fn resource(module: &str, resource: &str, reason: impl ToString) -> Self {
        Self::Resource {
            module: module.to_string(),
            resource: resource.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ModuleResult<T> = Result<T, ModuleError>;
