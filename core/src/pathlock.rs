//! Per-path serialization of mutating operations.
//!
//! Two writers targeting the same resolved path must not interleave; the
//! upload temp-file dance makes the final rename atomic, but delete/move/
//! copy sequences still need a mutual-exclusion point. Locks are advisory
//! and process-local: external processes touching the same files are out of
//! scope.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for one resolved path. Dropping it releases the lock.
pub type PathGuard = OwnedMutexGuard<()>;

const PRUNE_THRESHOLD: usize = 64;

/// Map of live per-path locks.
///
/// Entries are held weakly: once every guard for a path is dropped the
/// `Arc` dies and the entry becomes prunable. Pruning happens inline when
/// the map grows past a threshold, so the map stays bounded by the number
/// of concurrently locked paths.
#[derive(Debug, Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap();
        if let Some(existing) = map.get(path).and_then(Weak::upgrade) {
            return existing;
        }
        if map.len() >= PRUNE_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }
        let lock = Arc::new(AsyncMutex::new(()));
        map.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Acquire the mutation lock for one path.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        self.entry(path).lock_owned().await
    }

    /// Acquire locks for a source/destination pair.
    ///
    /// Locks are taken in path order so two operations locking the same
    /// pair from opposite ends cannot deadlock. Identical paths take a
    /// single lock.
    pub async fn lock_pair(&self, a: &Path, b: &Path) -> (PathGuard, Option<PathGuard>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        if a < b {
            let first = self.lock(a).await;
            let second = self.lock(b).await;
            (first, Some(second))
        } else {
            let second = self.lock(b).await;
            let first = self.lock(a).await;
            (first, Some(second))
        }
    }
}
