use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{Result, SwarmError};

/// RAII guard for an exclusive advisory lock on a file.
/// Every store mutation holds one of these.
pub struct LockGuard {
    file: File,
}

impl LockGuard {
    /// Block until the lock is acquired.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .map_err(|_| SwarmError::Locked(path.display().to_string()))?;
        Ok(Self { file })
    }

    /// Acquire without blocking; errors if another process holds the lock.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.try_lock_exclusive()
            .map_err(|_| SwarmError::Locked(path.display().to_string()))?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn try_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        let guard = LockGuard::acquire(&lock_path).unwrap();
        assert!(LockGuard::try_acquire(&lock_path).is_err());
        drop(guard);
        let _again = LockGuard::try_acquire(&lock_path).unwrap();
    }

    #[test]
    fn acquire_creates_missing_parent_dirs() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("locks").join("nested.lock");
        let _guard = LockGuard::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
    }
}
