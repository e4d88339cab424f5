use std::{fs::OpenOptions, io::{ErrorKind, Write}, path::{Path, PathBuf}};

use nix::{errno::Errno, sys::signal::kill, unistd::Pid};
use thiserror::Error;
use tracing::{debug, warn};

pub const LOCK_FILE: &str = ".pi_backup.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another backup or restore is running (lock file {0})")]
    Locked(PathBuf),
    #[error("could not create lock file: {0}")]
    IOError(#[from] std::io::Error),
}

///
/// Exclusive run lock held for a whole backup or restore. The lock file is
/// removed when the guard is dropped.
///
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    ///
    /// Takes the lock in `backups_dir`. A lock left behind by a process that
    /// no longer exists is reclaimed.
    ///
    pub fn acquire(backups_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(backups_dir)?;
        let path = backups_dir.join(LOCK_FILE);

        match Self::create(&path) {
            Err(LockError::Locked(_)) if is_stale(&path) => {
                warn!("Reclaiming stale lock file {}", path.display());
                std::fs::remove_file(&path)?;
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self, LockError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(LockError::Locked(path.to_path_buf())),
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired run lock {}", path.display());

        Ok(Self { path: path.to_path_buf() })
    }
}

///
/// True when the lock file names no live process. Unreadable or garbled
/// contents count as stale.
///
fn is_stale(path: &Path) -> bool {
    let pid = std::fs::read_to_string(path).ok().and_then(|s| s.trim().parse::<i32>().ok());
    match pid {
        Some(pid) if pid > 0 => kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH),
        _ => true,
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove lock file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");

        let lock = RunLock::acquire(&backups).unwrap();
        assert!(matches!(RunLock::acquire(&backups), Err(LockError::Locked(_))));

        drop(lock);
        assert!(!backups.join(LOCK_FILE).exists());
        assert!(RunLock::acquire(&backups).is_ok());
    }

    #[test]
    fn test_lock_of_dead_process_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        // above the kernel's pid_max ceiling, so never a live process
        std::fs::write(dir.path().join(LOCK_FILE), "4194999\n").unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        let owner = std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn test_lock_of_live_process_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), format!("{}\n", std::process::id())).unwrap();

        assert!(matches!(RunLock::acquire(dir.path()), Err(LockError::Locked(_))));
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_garbled_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "").unwrap();
        assert!(RunLock::acquire(dir.path()).is_ok());
    }
}
