//! Audio chunking and recombination
//!
//! Uploads are cut into fixed-length chunks stored in the audio pool. Clips are
//! assembled by consuming random chunks, so a chunk is never handed out twice.

use crate::audio::mp3::Mp3Track;
use crate::buffer::PoolName;
use crate::error::{Error, Result};
use crate::lifecycle::ResourceLifecycle;
use crate::media::MediaKind;
use inferno_common::ResourceId;
use rand::seq::SliceRandom;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Splits uploads into the audio pool and assembles clips out of it
#[derive(Clone)]
pub struct AudioRecombinationEngine {
    lifecycle: ResourceLifecycle,
    chunk_length_ms: u64,
}

impl AudioRecombinationEngine {
    pub fn new(lifecycle: ResourceLifecycle, chunk_length_ms: u64) -> Self {
        Self {
            lifecycle,
            chunk_length_ms,
        }
    }

    pub fn chunk_length_ms(&self) -> u64 {
        self.chunk_length_ms
    }

    /// Validate an upload, park it in intake and chunk it into the audio pool
    ///
    /// Returns the number of chunks stored.
    pub fn ingest(&self, payload: &[u8], declared_filename: &str) -> Result<usize> {
        let path = self.lifecycle.intake(payload, declared_filename, MediaKind::Audio)?;
        self.subdivide(&path, self.chunk_length_ms)
    }

    /// Cut the intake file at `path` into `chunk_length_ms` chunks
    ///
    /// The source file is removed whether or not chunking succeeded.
    pub fn subdivide(&self, path: &Path, chunk_length_ms: u64) -> Result<usize> {
        let intake = self.lifecycle.buffers().get(PoolName::Intake);
        let result = self.store_chunks(path, chunk_length_ms);
        intake.remove(path);

        if let Ok(stored) = &result {
            info!("Split {} into {} chunks of {} ms", path.display(), stored, chunk_length_ms);
        }
        result
    }

    fn store_chunks(&self, path: &Path, chunk_length_ms: u64) -> Result<usize> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Internal(format!("No file name in {}", path.display())))?;

        let track = Mp3Track::decode(&std::fs::read(path)?)?;
        let chunks = track.split(chunk_length_ms);

        for (index, chunk) in chunks.iter().enumerate() {
            let file_name = format!("{}_chunk_{}.mp3", stem, index);
            self.lifecycle.store(PoolName::Audio, &file_name, &chunk.encode())?;
        }
        Ok(chunks.len())
    }

    /// Build a clip out of up to `requested` random chunks and stage it for delivery
    ///
    /// The first usable chunk fixes the clip's format. Chunks in another format stay in
    /// the pool for a later clip, chunks that cannot be demuxed at all are deleted, and
    /// every chunk joined into the clip is consumed. A request for more chunks than the
    /// pool can supply is capped to what is there. An empty pool is `NotFound`.
    pub fn assemble(&self, requested: usize) -> Result<PathBuf> {
        let audio = self.lifecycle.buffers().get(PoolName::Audio);
        let mut candidates = audio.list()?;
        if candidates.is_empty() || requested == 0 {
            return Err(Error::NotFound("No files in audio buffer".to_string()));
        }
        candidates.shuffle(&mut rand::thread_rng());

        let mut clip = Mp3Track::default();
        let mut consumed = 0;
        let mut discarded = 0;
        let mut left = 0;
        for path in candidates {
            if consumed == requested {
                break;
            }

            // Another request may have taken it since the pool was listed
            let payload = match std::fs::read(&path) {
                Ok(payload) => payload,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let chunk = match Mp3Track::decode(&payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Discarding chunk {}: {}", path.display(), e);
                    if audio.remove(&path) {
                        discarded += 1;
                    }
                    continue;
                }
            };
            if !clip.accepts(&chunk) {
                left += 1;
                continue;
            }
            if !audio.remove(&path) {
                continue;
            }
            clip.append(chunk)?;
            consumed += 1;
        }

        if left > 0 {
            debug!("Left {} chunks in another format in the audio pool", left);
        }
        if clip.is_empty() && discarded == 0 {
            return Err(Error::NotFound("No files in audio buffer".to_string()));
        }
        if clip.is_empty() {
            return Err(Error::Decode(format!(
                "None of the {} discarded chunks held playable audio",
                discarded
            )));
        }

        let file_name = format!("{}.mp3", ResourceId::generate().stem("audio_clip"));
        let assembled = self
            .lifecycle
            .buffers()
            .get(PoolName::Intake)
            .add(&file_name, &clip.encode())?;
        info!(
            "Assembled {} ms clip from {} chunks (requested {})",
            clip.duration_ms(),
            consumed,
            requested
        );

        self.lifecycle.stage(&assembled)
    }
}
