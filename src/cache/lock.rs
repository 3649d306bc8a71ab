//! Single-writer guard for the cache directory.
//!
//! Two overlapping runs against the same `seen_content.json` would each load,
//! mutate and rewrite the file, and the later writer would drop the other's
//! insertions. [`RunLock`] makes the second run back off instead.
//!
//! The lock file holds the owner's pid. It is written and synced under a
//! private name first and then hard-linked into place, so a lock file is
//! never observed half-written. A lock whose owner is no longer alive (or
//! whose content cannot be read) is stale and is taken over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = "run.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run (pid {pid}) holds the cache lock")]
    Held { pid: u32 },

    #[error("lock file I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held for the duration of one run; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock inside `dir`, creating the directory if needed.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if let Some(pid) = live_owner(&path) {
                    return Err(LockError::Held { pid });
                }
                warn!(path = %path.display(), "Removing stale run lock");
                fs::remove_file(&path)?;
                Ok(Self::create(&path)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> io::Result<Self> {
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let staging = staging_path(path, info.pid);
        let written = write_synced(&staging, &serde_json::to_vec(&info)?);
        // fails with AlreadyExists while another run holds the lock
        let published = written.and_then(|()| fs::hard_link(&staging, path));
        let _ = fs::remove_file(&staging);
        published?;

        debug!(path = %path.display(), pid = info.pid, "Acquired run lock");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn staging_path(path: &Path, pid: u32) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{pid}.tmp"));
    path.with_file_name(name)
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Pid of the lock's owner if that process is still running.
fn live_owner(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    let info: LockInfo = serde_json::from_str(&contents).ok()?;
    process_alive(info.pid).then_some(info.pid)
}

/// A process we may not signal (`EPERM`) still exists.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // 0 and negative values address process groups, not one process
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the existence/permission check only.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        let path = lock.path().to_path_buf();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused_while_held() {
        let dir = tempdir().unwrap();
        let _held = RunLock::acquire(dir.path()).unwrap();
        match RunLock::acquire(dir.path()) {
            Err(LockError::Held { pid }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_lock_file_is_stale() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE_NAME), "not json").unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        assert!(contents.contains(&std::process::id().to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_owner_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        // pid_max on Linux is far below this value, so no process can own it
        let stale = LockInfo {
            pid: 999_999_999,
            acquired_at: Utc::now(),
        };
        fs::write(
            dir.path().join(LOCK_FILE_NAME),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_lock_file_is_complete_and_staging_is_cleaned_up() {
        let dir = tempdir().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();

        let info: LockInfo = serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(info.pid, std::process::id());
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![LOCK_FILE_NAME.to_string()]);
    }

    #[test]
    fn test_refused_acquire_leaves_the_held_lock_intact() {
        let dir = tempdir().unwrap();
        let held = RunLock::acquire(dir.path()).unwrap();
        let before = fs::read_to_string(held.path()).unwrap();

        assert!(matches!(RunLock::acquire(dir.path()), Err(LockError::Held { .. })));
        assert_eq!(fs::read_to_string(held.path()).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_alive_counts_unsignalable_processes() {
        assert!(process_alive(std::process::id()));
        // pid 1 always exists; unprivileged callers get EPERM for it
        assert!(process_alive(1));
        assert!(!process_alive(0));
        assert!(!process_alive(u32::MAX));
    }
}
