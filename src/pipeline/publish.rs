//! Publishing finished directories into a shared tree.
//!
//! Several requests can resolve to the same folder name. Publication of one
//! target is serialised through a per-path async lock ([`lock_target`]), and
//! [`replace_dir`] moves the previous copy aside into a dot-prefixed
//! directory before renaming the new one in. The target is therefore absent
//! only between two renames, and the last request to publish wins.

use crate::error::SyncError;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Target path → lock held while that target is being replaced.
static PUBLISH_LOCKS: Lazy<DashMap<PathBuf, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

/// Renames tried before giving up on a target another process keeps refilling.
const PUBLISH_ATTEMPTS: usize = 3;

/// Exclusive right to replace one target path.
pub struct PublishGuard {
    target: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        // Two references: the map's and the one inside `_guard`.
        PUBLISH_LOCKS.remove_if(&self.target, |_, lock| Arc::strong_count(lock) == 2);
    }
}

/// Wait until no other task in this process is publishing to `target`.
pub async fn lock_target(target: &Path) -> PublishGuard {
    let lock = PUBLISH_LOCKS
        .entry(target.to_path_buf())
        .or_default()
        .clone();
    PublishGuard {
        target: target.to_path_buf(),
        _guard: lock.lock_owned().await,
    }
}

/// Move `staging` to `target`, replacing any previous copy.
///
/// `staging` must live on the same filesystem as `target`.
pub fn replace_dir(staging: &Path, target: &Path) -> std::io::Result<()> {
    let parent = target.parent().unwrap_or(Path::new("."));
    // Removed, with whatever was moved into it, when this function returns.
    let retired = tempfile::Builder::new().prefix(".old-").tempdir_in(parent)?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let previous = retired.path().join(attempt.to_string());
        match std::fs::rename(target, &previous) {
            Ok(()) => debug!("Retired previous {}", target.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        match std::fs::rename(staging, target) {
            Ok(()) => return Ok(()),
            Err(e) if is_occupied(&e) && attempt < PUBLISH_ATTEMPTS => {
                debug!("{} was refilled during publish; retrying", target.display());
            }
            Err(e) => {
                if previous.exists() && !target.exists() {
                    let _ = std::fs::rename(&previous, target);
                }
                return Err(e);
            }
        }
    }
}

/// Async form of [`replace_dir`].
pub async fn publish_dir(staging: &Path, target: &Path) -> Result<(), SyncError> {
    let (staging, target) = (staging.to_path_buf(), target.to_path_buf());
    tokio::task::spawn_blocking(move || replace_dir(&staging, &target).map_err(|e| SyncError::io(&target, e)))
        .await
        .map_err(|e| SyncError::Internal(format!("Publish task panicked: {}", e)))?
}

fn is_occupied(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::DirectoryNotEmpty | ErrorKind::AlreadyExists)
}
