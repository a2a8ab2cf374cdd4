use std::path::{Path, PathBuf};

use romkit_modules::RomLayout;
use romkit_project::write_atomic;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "ROMKIT_CONFIG";

/// User settings, loaded and saved by the CLI and passed into operations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Layout file used when `--layout` is not given.
    pub layout: Option<PathBuf>,
    /// Grow the ROM through the layout's expansion sizes when compile runs
    /// out of free space.
    pub auto_expand: bool,
    /// Emulator launched by `romkit run`.
    pub emulator: Option<PathBuf>,
}

impl ToolConfig {
    /// `$ROMKIT_CONFIG`, else `$HOME/.config/romkit/config.toml`, else
    /// `romkit.toml` in the working directory.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(".config").join("romkit").join("config.toml"),
            None => PathBuf::from("romkit.toml"),
        }
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let text = toml::to_string(self)?;
        write_atomic(path, text.as_bytes())?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    /// The layout at `override_path`, else the configured one, else the
    /// built-in default.
    pub fn resolve_layout(&self, override_path: Option<&Path>) -> CoreResult<RomLayout> {
        match override_path.or(self.layout.as_deref()) {
            Some(path) => RomLayout::load(path).map_err(CoreError::Layout),
            None => Ok(RomLayout::default()),
        }
    }

    /// Set one key from its string form. Returns `false` for unknown keys.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let path = || (!value.is_empty()).then(|| PathBuf::from(value));
        match key {
            "layout" => self.layout = path(),
            "emulator" => self.emulator = path(),
            "auto_expand" => self.auto_expand = matches!(value, "true" | "1" | "yes" | "on"),
            _ => return false,
        }
        true
    }
}
