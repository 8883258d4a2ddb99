//! File-backed account activity log.

use crate::storage::FileLock;
use pulsekeeper_core::activity::{ActivityLog, LogLevel, LogRecord};
use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default log file name inside the data directory.
pub const LOG_FILE_NAME: &str = "roblox_heartbeat.log";

/// Appends activity records to a shared text file.
///
/// Each append takes the in-process mutex, then the `<log>.lock` marker, so
/// records from concurrent monitors land as whole lines. The marker is
/// advisory for other processes (see [`FileLock`]). Every record is mirrored
/// to `tracing`.
pub struct FileActivityLog {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FileActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the whole log, or `None` if nothing has been written yet.
    pub fn read_all(&self) -> std::io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let _guard = self
            .write_guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _lock = FileLock::acquire(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

impl ActivityLog for FileActivityLog {
    fn append(&self, record: LogRecord) {
        mirror_to_tracing(&record);

        if let Err(e) = self.write_line(&record.to_line()) {
            tracing::error!(
                "[ActivityLog] Failed to write to log file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn mirror_to_tracing(record: &LogRecord) {
    let account = record.account.as_str();
    match record.level {
        LogLevel::Error => tracing::error!(account, level = %record.level, "{}", record.message),
        LogLevel::Warning => tracing::warn!(account, level = %record.level, "{}", record.message),
        _ => tracing::info!(account, level = %record.level, "{}", record.message),
    }
}
