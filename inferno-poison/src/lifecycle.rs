//! Upload and serve pipeline shared by images and audio
//!
//! Intake: validate by signature, then commit to the target pool under the capacity
//! tiers of [`BufferPool::admit`]. Serve: move a random resource into the delivery
//! pool and schedule its deletion.

use crate::buffer::{Buffers, DeferredDeletion, DeletionScheduler, PoolName, SlotStatus};
use crate::error::{Error, Result};
use crate::media::{self, MediaKind};
use inferno_common::ResourceId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Intake and serve operations over the shared buffers
#[derive(Clone)]
pub struct ResourceLifecycle {
    buffers: Arc<Buffers>,
    scheduler: Arc<DeletionScheduler>,
}

impl ResourceLifecycle {
    pub fn new(buffers: Arc<Buffers>, scheduler: Arc<DeletionScheduler>) -> Self {
        Self { buffers, scheduler }
    }

    pub fn buffers(&self) -> &Arc<Buffers> {
        &self.buffers
    }

    pub fn scheduler(&self) -> &Arc<DeletionScheduler> {
        &self.scheduler
    }

    /// Startup reset: empty intake and delivery, randomly trim durable pools
    ///
    /// The corpus file named `seed_file` is never trimmed.
    pub fn initialize_buffers(&self, seed_file: Option<&str>) -> Result<()> {
        let seed_path = seed_file.map(|name| self.buffers.get(PoolName::Corpus).location().join(name));
        self.buffers.initialize(seed_path.as_deref())
    }

    /// Pool an accepted upload of `kind` lands in
    ///
    /// Audio goes through intake first so it can be chunked.
    pub fn target_pool(kind: MediaKind) -> PoolName {
        match kind {
            MediaKind::Image => PoolName::Image,
            MediaKind::Audio => PoolName::Intake,
        }
    }

    /// Validate `payload` as `kind` and persist it
    ///
    /// Nothing is written for a rejected payload.
    pub fn intake(&self, payload: &[u8], declared_filename: &str, kind: MediaKind) -> Result<PathBuf> {
        media::validate(payload, kind, declared_filename)?;

        let id = ResourceId::generate();
        let file_name = format!("{}.{}", id.stem(kind.as_prefix()), kind.extension());
        let path = self.store(Self::target_pool(kind), &file_name, payload)?;

        info!(
            "Uploaded file '{}' saved as {}",
            declared_filename,
            path.display()
        );
        Ok(path)
    }

    /// Commit bytes to `pool`, evicting per the overflow tier
    ///
    /// A severe overflow is corrected before the write; a mild one schedules a deferred
    /// eviction so files being streamed right now are not pulled from under a reader.
    pub fn store(&self, pool: PoolName, file_name: &str, payload: &[u8]) -> Result<PathBuf> {
        let pool = self.buffers.get(pool);
        let (path, status) = pool.admit(file_name, payload)?;

        if status == SlotStatus::WouldOverflow {
            debug!("{} pool over capacity, deferring an eviction", pool.name());
            self.scheduler.schedule_eviction(Arc::clone(pool));
        }

        Ok(path)
    }

    /// Hand a random resource of `pool` to the transport layer
    ///
    /// The resource is moved into the delivery pool and deleted after the configured
    /// delay. An empty pool is `NotFound`.
    pub fn serve(&self, pool: PoolName) -> Result<PathBuf> {
        let source = self.buffers.get(pool);
        let delivery = self.buffers.get(PoolName::Delivery);

        let staged = source
            .move_random_to(delivery)?
            .ok_or_else(|| Error::NotFound(format!("No files in {} buffer", pool)))?;

        self.schedule_deletion(staged.clone());
        info!("Serving {} from {} pool", staged.display(), pool);
        Ok(staged)
    }

    /// Move a specific resource into delivery and schedule its deletion
    pub fn stage(&self, path: &Path) -> Result<PathBuf> {
        let source = self.buffers.pool_for_path(path)?;
        let staged = source.move_to(path, self.buffers.get(PoolName::Delivery))?;
        self.schedule_deletion(staged.clone());
        Ok(staged)
    }

    fn schedule_deletion(&self, staged: PathBuf) -> Option<DeferredDeletion> {
        let delivery = Arc::clone(self.buffers.get(PoolName::Delivery));
        self.scheduler.schedule_deletion(delivery, staged)
    }
}
