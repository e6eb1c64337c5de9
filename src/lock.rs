//! Cross-process advisory lock for index storage.
//!
//! Mutating lifecycle operations hold a [`StorageLock`] on
//! `<storage>.lock`, a sibling of the storage directory. The file is created
//! exclusively and removed when the guard is dropped; a second process that
//! finds it present fails fast with [`IndexError::Locked`].

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Held for the duration of a rebuild, restore or delete.
#[derive(Debug)]
pub struct StorageLock {
    path: PathBuf,
}

impl StorageLock {
    pub fn acquire(storage: &Path) -> Result<Self> {
        let path = lock_path(storage);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::storage(parent, e))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(IndexError::Locked { path });
            }
            Err(e) => return Err(IndexError::storage(path, e)),
        };
        // Owner pid, for humans clearing a stale lock.
        let _ = writeln!(file, "{}", std::process::id());

        tracing::debug!(lock = %path.display(), "storage lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove storage lock");
        }
    }
}

/// `vector_db` → `vector_db.lock`.
pub fn lock_path(storage: &Path) -> PathBuf {
    let mut name = storage
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".lock");
    storage.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let tmp = TempDir::new().unwrap();
        let storage = tmp.path().join("vector_db");

        let held = StorageLock::acquire(&storage).unwrap();
        assert!(held.path().ends_with("vector_db.lock"));
        let err = StorageLock::acquire(&storage).unwrap_err();
        assert!(matches!(err, IndexError::Locked { .. }));

        drop(held);
        assert!(!tmp.path().join("vector_db.lock").exists());
        assert!(StorageLock::acquire(&storage).is_ok());
    }

    #[test]
    fn test_lock_does_not_create_storage_dir() {
        let tmp = TempDir::new().unwrap();
        let storage = tmp.path().join("vector_db");
        let _lock = StorageLock::acquire(&storage).unwrap();
        assert!(!storage.exists());
    }
}
