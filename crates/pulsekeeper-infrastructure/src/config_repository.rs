//! JSON-file implementation of [`ConfigRepository`].

use crate::storage::{AtomicJsonError, AtomicJsonFile};
use pulsekeeper_core::account::{AccountSettings, Mode, PulseConfig};
use pulsekeeper_core::error::{PulseError, Result};
use pulsekeeper_core::repository::ConfigRepository;
use std::fs;
use std::path::{Path, PathBuf};

/// Username of the placeholder account written by [`default_scaffold`].
pub const PLACEHOLDER_USERNAME: &str = "DefaultAccount";
/// Credential of the placeholder account; rejected by validation on purpose.
pub const PLACEHOLDER_COOKIE: &str = "YOUR_ROBLOX_COOKIE_HERE";

/// Stores the configuration document as pretty-printed JSON.
pub struct JsonConfigRepository {
    file: AtomicJsonFile<PulseConfig>,
}

impl JsonConfigRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: AtomicJsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn exists(&self) -> bool {
        self.file.path().exists()
    }

    /// `<config>.bak`, next to the configuration file.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path()
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".bak");
        self.path().with_file_name(name)
    }
}

impl ConfigRepository for JsonConfigRepository {
    fn load(&self) -> Result<Option<PulseConfig>> {
        self.file.load().map_err(|e| match e {
            AtomicJsonError::JsonError(err) => {
                PulseError::ConfigLoad(format!("{}: {}", self.path().display(), err))
            }
            other => PulseError::ConfigLoad(format!("{}: {}", self.path().display(), other)),
        })
    }

    fn save(&self, config: &PulseConfig) -> Result<()> {
        self.file.save(config).map_err(|e| match e {
            AtomicJsonError::IoError(err) => err.into(),
            AtomicJsonError::JsonError(err) => err.into(),
            AtomicJsonError::LockError(message) => PulseError::io(message),
        })
    }

    fn backup(&self) -> Result<Option<String>> {
        if !self.exists() {
            return Ok(None);
        }
        let target = self.backup_path();
        fs::copy(self.path(), &target)?;
        Ok(Some(target.display().to_string()))
    }
}

/// Configuration written when no file exists yet: default globals plus one
/// placeholder account for the operator to edit.
pub fn default_scaffold() -> PulseConfig {
    PulseConfig {
        accounts: vec![
            AccountSettings::new(PLACEHOLDER_USERNAME, PLACEHOLDER_COOKIE)
                .with_mode(Mode::Full)
                .with_pulse_interval(30_000),
        ],
        global_config: Default::default(),
    }
}
