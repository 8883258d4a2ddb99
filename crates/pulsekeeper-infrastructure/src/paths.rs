//! Path management for pulsekeeper data files.
//!
//! ```text
//! ~/.config/pulsekeeper/          # default data directory
//! ├── config.json                 # accounts + global settings
//! └── roblox_heartbeat.log        # account activity log
//! ```

use crate::activity_log::LOG_FILE_NAME;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const HOME_ENV_VAR: &str = "PULSEKEEPER_HOME";
/// Configuration file name inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

const APP_DIR_NAME: &str = "pulsekeeper";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// No platform config directory could be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find a config directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Resolved locations of the data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulsePaths {
    base_dir: PathBuf,
}

impl PulsePaths {
    /// Uses `base_dir` as the data directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolves the data directory.
    ///
    /// Priority:
    /// 1. explicit override
    /// 2. `PULSEKEEPER_HOME`
    /// 3. `<platform config dir>/pulsekeeper`
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self, PathError> {
        if let Some(dir) = override_dir {
            return Ok(Self::new(dir));
        }
        if let Some(dir) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR_NAME)))
            .ok_or(PathError::ConfigDirNotFound)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.base_dir.join(LOG_FILE_NAME)
    }

    /// Creates the data directory if it is missing.
    pub fn ensure_base_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)
    }
}
