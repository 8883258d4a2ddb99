//! Lock marker files.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive lock on `<path>.lock`, released and removed when dropped.
///
/// The marker file is created next to the guarded file and locked with an
/// OS-level exclusive lock. Removal on drop means a waiter still holding the
/// old marker and a newcomer creating a fresh one can both succeed, so this is
/// not mutual exclusion between processes. Callers pair it with an in-process
/// mutex; one process per data directory is assumed.
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquires an exclusive lock guarding `path`, blocking until available.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        let lock_path = Self::lock_path_for(path);

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        file.lock_exclusive()?;

        Ok(FileLock { file, lock_path })
    }

    /// Returns the marker path used for `path`.
    pub fn lock_path_for(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        path.with_file_name(name)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        // Best effort: another waiter may already hold a handle to the marker
        let _ = fs::remove_file(&self.lock_path);
    }
}
