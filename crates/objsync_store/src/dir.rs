//! Store directory layout and locking.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ journal.log       # Commit journal
//! ```

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";
const JOURNAL_TEMP: &str = "journal.log.tmp";

/// An exclusively locked store directory.
///
/// The lock is held for as long as the value lives.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates the directory and takes the lock.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }
        if !path.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    pub(crate) fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    pub(crate) fn journal_temp_path(&self) -> PathBuf {
        self.path.join(JOURNAL_TEMP)
    }

    /// Deletes the journal files, keeping the directory and its lock.
    pub(crate) fn remove_journal(&self) -> StoreResult<()> {
        for path in [self.journal_path(), self.journal_temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.sync()
    }

    /// Syncs directory entries after a create, rename or delete.
    #[cfg(unix)]
    pub(crate) fn sync(&self) -> StoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        let _dir = StoreDir::open(&path, true).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn missing_directory_without_create() {
        let temp = tempdir().unwrap();
        assert!(StoreDir::open(&temp.path().join("nope"), false).is_err());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("locked");
        let _first = StoreDir::open(&path, true).unwrap();
        assert!(matches!(
            StoreDir::open(&path, true),
            Err(StoreError::Locked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("reopen");
        drop(StoreDir::open(&path, true).unwrap());
        let _again = StoreDir::open(&path, true).unwrap();
    }

    #[test]
    fn remove_journal_tolerates_missing_files() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path(), true).unwrap();
        fs::write(dir.journal_path(), b"x").unwrap();
        dir.remove_journal().unwrap();
        assert!(!dir.journal_path().exists());
        dir.remove_journal().unwrap();
    }
}
