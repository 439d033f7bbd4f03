use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

/// Exclusive per-consumer lock held for the duration of one sync.
///
/// The lock file is created with `create_new` and removed on drop. A stale
/// file left by a killed process must be deleted by hand.
#[derive(Debug)]
pub struct ConsumerLock {
    path: PathBuf,
}

impl ConsumerLock {
    pub fn acquire(locks_dir: &Path, consumer: &str) -> Result<Self> {
        fs::create_dir_all(locks_dir)
            .with_context(|| format!("Failed to create {}", locks_dir.display()))?;

        let path = locks_dir.join(format!("{}.lock", consumer));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => bail!(
                "Consumer '{}' is already being synced (lock file {} exists). \
                 If no other scsync process is running, delete the file and retry.",
                consumer,
                path.display()
            ),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()))
            }
        };

        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(consumer, path = %path.display(), "Lock acquired");

        Ok(Self { path })
    }
}

impl Drop for ConsumerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = TempDir::new().unwrap();
        let locks = dir.path().join("locks");

        let lock = ConsumerLock::acquire(&locks, "auctions").unwrap();
        assert!(locks.join("auctions.lock").exists());

        let err = ConsumerLock::acquire(&locks, "auctions").unwrap_err();
        assert!(err.to_string().contains("already being synced"));

        // other consumers are independent
        let other = ConsumerLock::acquire(&locks, "names").unwrap();

        drop(lock);
        assert!(!locks.join("auctions.lock").exists());
        ConsumerLock::acquire(&locks, "auctions").unwrap();
        drop(other);
    }
}
