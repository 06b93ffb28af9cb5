use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};

/// Lock file name inside the backup root
pub const LOCK_FILE_NAME: &str = ".gitbackup.lock";

/// Exclusive advisory lock held for the duration of a run
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Take the lock in `backup_root`, creating the directory if needed
    ///
    /// Fails with [`BackupError::Locked`] when another run holds it.
    pub fn acquire(backup_root: &Path) -> BackupResult<Self> {
        fs::create_dir_all(backup_root)?;
        let path = backup_root.join(LOCK_FILE_NAME);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { path, file }),
            Err(err) if is_lock_held(&err) => Err(BackupError::Locked { path }),
            Err(err) => Err(BackupError::Io(err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION on Windows
    matches!(err.raw_os_error(), Some(33))
}
