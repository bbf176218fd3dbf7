//! inferno-poison library - content poisoning service
//!
//! Accepts text, image and audio samples into bounded ephemeral buffers and serves
//! them back recombined: Markov-generated text, random images and clips stitched
//! together from random audio chunks.

pub mod api;
pub mod audio;
pub mod buffer;
pub mod error;
pub mod lifecycle;
pub mod markov;
pub mod media;

pub use api::build_router;
pub use error::{Error, Result};

use audio::AudioRecombinationEngine;
use buffer::{Buffers, DeletionScheduler, PoolName};
use inferno_common::TomlConfig;
use lifecycle::ResourceLifecycle;
use markov::CorpusManager;
use std::sync::Arc;
use tracing::info;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TomlConfig>,
    pub lifecycle: ResourceLifecycle,
    pub corpus: Arc<CorpusManager>,
    pub audio: AudioRecombinationEngine,
}

impl AppState {
    /// Open every buffer pool and wire up the components
    ///
    /// Must be called from within a tokio runtime. Missing pool directories are a
    /// configuration error.
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        config.validate()?;

        let buffers = Arc::new(Buffers::open(&config.storage.paths(), &config.limits)?);
        let scheduler = Arc::new(DeletionScheduler::new(config.limits.file_deletion_delay())?);
        let lifecycle = ResourceLifecycle::new(Arc::clone(&buffers), scheduler);

        let corpus = Arc::new(CorpusManager::new(
            Arc::clone(buffers.get(PoolName::Corpus)),
            config.markov.clone(),
            config.limits.corpus_max_count,
        ));
        let audio = AudioRecombinationEngine::new(lifecycle.clone(), config.audio.chunk_length_ms);

        Ok(Self {
            config: Arc::new(config.clone()),
            lifecycle,
            corpus,
            audio,
        })
    }

    /// Startup hooks: reset the buffers and build the Markov model
    ///
    /// Both steps set pool counts from disk, so their order does not matter.
    pub fn initialize(&self) -> Result<()> {
        self.lifecycle
            .initialize_buffers(self.config.markov.seed_file.as_deref())?;
        self.corpus.initialize()?;
        info!("Buffers and Markov model initialized");
        Ok(())
    }

    /// Cancel deferred deletions and evictions that have not fired yet
    pub fn shutdown(&self) {
        self.lifecycle.scheduler().shutdown();
    }
}
