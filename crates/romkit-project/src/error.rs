use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("no project manifest at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        source: toml::ser::Error,
    },

    #[error("resource {module_id}/{resource_id} is not listed in the manifest")]
    UnknownResource {
        module_id: String,
        resource_id: String,
    },

    #[error("resource file missing: {0}")]
    ResourceFileMissing(PathBuf),

    #[error("resource path must stay inside the project: {0}")]
    UnsafePath(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ProjectError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type ProjectResult<T> = Result<T, ProjectError>;
