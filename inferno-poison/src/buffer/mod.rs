//! Ephemeral resource buffers
//!
//! One [`BufferPool`] per fixed pool name, opened once at startup from the storage
//! configuration and shared by every component through [`Buffers`].

pub mod deletion;
pub mod pool;

pub use deletion::{DeferredDeletion, DeletionScheduler};
pub use pool::{BufferPool, PoolName, SlotStatus};

use crate::error::{Error, Result};
use inferno_common::config::{LimitsConfig, StoragePaths};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The full set of managed pools
#[derive(Debug)]
pub struct Buffers {
    image: Arc<BufferPool>,
    audio: Arc<BufferPool>,
    corpus: Arc<BufferPool>,
    intake: Arc<BufferPool>,
    delivery: Arc<BufferPool>,
}

impl Buffers {
    /// Open every pool; any missing directory aborts startup
    pub fn open(paths: &StoragePaths, limits: &LimitsConfig) -> Result<Self> {
        let buffers = Self {
            image: Arc::new(BufferPool::open(
                PoolName::Image,
                &paths.image,
                Some(limits.image_max_count),
            )?),
            audio: Arc::new(BufferPool::open(
                PoolName::Audio,
                &paths.audio,
                Some(limits.audio_max_count),
            )?),
            corpus: Arc::new(BufferPool::open(
                PoolName::Corpus,
                &paths.corpus,
                Some(limits.corpus_max_count),
            )?),
            intake: Arc::new(BufferPool::open(PoolName::Intake, &paths.intake, None)?),
            delivery: Arc::new(BufferPool::open(PoolName::Delivery, &paths.delivery, None)?),
        };

        let mut locations: Vec<&Path> = PoolName::ALL
            .iter()
            .map(|name| buffers.get(*name).location())
            .collect();
        locations.sort();
        locations.dedup();
        if locations.len() != PoolName::ALL.len() {
            return Err(Error::Config(
                "Every pool needs its own storage directory".to_string(),
            ));
        }

        Ok(buffers)
    }

    /// Pool by name
    pub fn get(&self, name: PoolName) -> &Arc<BufferPool> {
        match name {
            PoolName::Image => &self.image,
            PoolName::Audio => &self.audio,
            PoolName::Corpus => &self.corpus,
            PoolName::Intake => &self.intake,
            PoolName::Delivery => &self.delivery,
        }
    }

    /// Pool owning `path`
    ///
    /// A path outside every managed pool is a configuration error.
    pub fn pool_for_path(&self, path: &Path) -> Result<&Arc<BufferPool>> {
        PoolName::ALL
            .iter()
            .map(|name| self.get(*name))
            .find(|pool| pool.contains(path))
            .ok_or_else(|| {
                Error::Config(format!("{} is not inside a managed buffer", path.display()))
            })
    }

    /// Live count of every pool
    pub fn counts(&self) -> Vec<(PoolName, usize)> {
        PoolName::ALL
            .iter()
            .map(|name| (*name, self.get(*name).live_count()))
            .collect()
    }

    /// Empty transient pools and randomly trim durable pools to capacity
    ///
    /// `corpus_keep` names a corpus file exempt from trimming.
    pub fn initialize(&self, corpus_keep: Option<&Path>) -> Result<()> {
        for name in PoolName::ALL {
            let pool = self.get(name);
            if name.is_transient() {
                pool.clear()?;
                continue;
            }

            let keep = if name == PoolName::Corpus { corpus_keep } else { None };
            if let Some(max) = pool.max_count() {
                pool.trim_to_capacity(max, keep)?;
            }
        }

        info!(
            "Buffers initialized: {}",
            self.counts()
                .iter()
                .map(|(name, count)| format!("{}={}", name, count))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_common::config::StorageConfig;
    use tempfile::TempDir;

    fn open_buffers(limits: &LimitsConfig) -> (TempDir, Buffers) {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig::rooted_at(dir.path());
        storage.ensure_directories().unwrap();
        let buffers = Buffers::open(&storage.paths(), limits).unwrap();
        (dir, buffers)
    }

    #[test]
    fn test_open_fails_when_a_pool_directory_is_missing() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig::rooted_at(dir.path());
        std::fs::create_dir_all(storage.paths().image).unwrap();

        assert!(matches!(
            Buffers::open(&storage.paths(), &LimitsConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_shared_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let mut storage = StorageConfig::rooted_at(dir.path());
        storage.delivery_dir = storage.intake_dir.clone();
        storage.ensure_directories().unwrap();

        assert!(Buffers::open(&storage.paths(), &LimitsConfig::default()).is_err());
    }

    #[test]
    fn test_pool_for_path() {
        let (_dir, buffers) = open_buffers(&LimitsConfig::default());
        let inside = buffers.get(PoolName::Audio).location().join("chunk.mp3");

        assert_eq!(buffers.pool_for_path(&inside).unwrap().name(), PoolName::Audio);
        assert!(matches!(
            buffers.pool_for_path(Path::new("/tmp/elsewhere.mp3")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_initialize_empties_transient_and_trims_durable() {
        let limits = LimitsConfig {
            image_max_count: 2,
            audio_max_count: 3,
            corpus_max_count: 1,
            ..LimitsConfig::default()
        };
        let (_dir, buffers) = open_buffers(&limits);

        for i in 0..5 {
            buffers.get(PoolName::Image).add(&format!("i{}.jpg", i), b"x").unwrap();
            buffers.get(PoolName::Audio).add(&format!("a{}.mp3", i), b"x").unwrap();
            buffers.get(PoolName::Intake).add(&format!("n{}.mp3", i), b"x").unwrap();
            buffers.get(PoolName::Delivery).add(&format!("d{}.jpg", i), b"x").unwrap();
        }
        let seed = buffers.get(PoolName::Corpus).add("seed.txt", b"seed").unwrap();
        buffers.get(PoolName::Corpus).add("corpus_1", b"more").unwrap();

        buffers.initialize(Some(&seed)).unwrap();

        let counts: std::collections::HashMap<_, _> = buffers.counts().into_iter().collect();
        assert_eq!(counts[&PoolName::Image], 2);
        assert_eq!(counts[&PoolName::Audio], 3);
        assert_eq!(counts[&PoolName::Corpus], 1);
        assert_eq!(counts[&PoolName::Intake], 0);
        assert_eq!(counts[&PoolName::Delivery], 0);
        assert!(seed.exists());

        for name in PoolName::ALL {
            let pool = buffers.get(name);
            assert_eq!(pool.live_count(), pool.list().unwrap().len());
        }
    }
}
