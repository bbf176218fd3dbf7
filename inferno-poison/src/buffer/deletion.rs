//! Deferred deletion and deferred eviction
//!
//! Served files are deleted a fixed delay after hand-off so the transport layer can
//! finish streaming them. Each scheduled entry is a tokio task racing its timer against
//! a cancellation token; firing goes through [`BufferPool::remove`], so a target that
//! is already gone is logged and ignored.

use crate::buffer::BufferPool;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A deletion scheduled for a served resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredDeletion {
    pub resource_path: PathBuf,
    pub fire_at: Instant,
}

struct PendingEntry {
    id: u64,
    token: CancellationToken,
}

type PendingMap = Arc<Mutex<HashMap<PathBuf, PendingEntry>>>;

/// Schedules delayed deletions and evictions on the tokio runtime
pub struct DeletionScheduler {
    handle: Handle,
    delay: Duration,
    shutdown: CancellationToken,
    pending: PendingMap,
    next_id: AtomicU64,
    pending_evictions: Arc<AtomicUsize>,
}

impl DeletionScheduler {
    /// Create a scheduler bound to the current tokio runtime
    pub fn new(delay: Duration) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            Error::Internal(format!("Deletion scheduler needs a tokio runtime: {}", e))
        })?;
        Ok(Self::with_handle(handle, delay))
    }

    /// Create a scheduler bound to an explicit runtime handle
    pub fn with_handle(handle: Handle, delay: Duration) -> Self {
        Self {
            handle,
            delay,
            shutdown: CancellationToken::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            pending_evictions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<PathBuf, PendingEntry>> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule deletion of `path` from `pool` after the configured delay
    ///
    /// At most one deletion is pending per path; a second request for the same path
    /// returns `None` and leaves the first one in place.
    pub fn schedule_deletion(&self, pool: Arc<BufferPool>, path: PathBuf) -> Option<DeferredDeletion> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();

        {
            let mut pending = Self::lock_pending(&self.pending);
            if pending.contains_key(&path) {
                debug!("Deletion already scheduled for {}", path.display());
                return None;
            }
            pending.insert(
                path.clone(),
                PendingEntry {
                    id,
                    token: token.clone(),
                },
            );
        }

        let fire_at = Instant::now() + self.delay;
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        let task_path = path.clone();

        self.handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Deletion of {} cancelled", task_path.display());
                }
                _ = tokio::time::sleep(delay) => {
                    if !pool.remove(&task_path) {
                        debug!("Deferred deletion of {} found nothing to delete", task_path.display());
                    }
                }
            }

            // Only clear our own entry; the path may have been rescheduled after a cancel
            let mut pending = Self::lock_pending(&pending);
            if pending.get(&task_path).map(|e| e.id) == Some(id) {
                pending.remove(&task_path);
            }
        });

        info!("Scheduled deletion of {} in {:?}", path.display(), delay);
        Some(DeferredDeletion {
            resource_path: path,
            fire_at,
        })
    }

    /// Schedule one random eviction from `pool`, applied only if it is still over
    /// capacity when the delay elapses
    pub fn schedule_eviction(&self, pool: Arc<BufferPool>) {
        let token = self.shutdown.child_token();
        let delay = self.delay;
        let counter = Arc::clone(&self.pending_evictions);
        counter.fetch_add(1, Ordering::AcqRel);

        self.handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    match pool.evict_if_over_capacity() {
                        Ok(Some(path)) => debug!("Deferred eviction removed {}", path.display()),
                        Ok(None) => debug!("{} pool back within capacity, nothing evicted", pool.name()),
                        Err(e) => warn!("Deferred eviction from {} pool failed: {}", pool.name(), e),
                    }
                }
            }
            counter.fetch_sub(1, Ordering::AcqRel);
        });

        debug!("Scheduled deferred eviction in {:?}", delay);
    }

    /// Cancel the pending deletion of `path`
    pub fn cancel(&self, path: &Path) -> bool {
        match Self::lock_pending(&self.pending).remove(path) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a deletion is pending for `path`
    pub fn is_pending(&self, path: &Path) -> bool {
        Self::lock_pending(&self.pending).contains_key(path)
    }

    /// Number of pending deletions
    pub fn pending(&self) -> usize {
        Self::lock_pending(&self.pending).len()
    }

    /// Number of pending deferred evictions
    pub fn pending_evictions(&self) -> usize {
        self.pending_evictions.load(Ordering::Acquire)
    }

    /// Cancel everything that has not fired yet
    pub fn shutdown(&self) {
        let cancelled = {
            let mut pending = Self::lock_pending(&self.pending);
            let n = pending.len();
            pending.clear();
            n
        };
        self.shutdown.cancel();
        info!("Deletion scheduler shut down, {} pending deletions cancelled", cancelled);
    }
}
