//! Corpus pool and the running Markov model built from it
//!
//! Every corpus file contributes one model, folded into the running model. Pruning
//! is FIFO by write order and keeps the configured seed file plus at least two files.
//! A pruned file's contribution stays in the running model unless `rebuild_on_prune`
//! is set, in which case the model is rebuilt from the files left on disk.

use crate::buffer::BufferPool;
use crate::error::{Error, Result};
use crate::markov::MarkovModel;
use inferno_common::config::MarkovConfig;
use inferno_common::ResourceId;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Literal prefix of every generation failure message
pub const GENERATION_ERROR_PREFIX: &str = "ERROR";

/// Fewest corpus files pruning may leave behind
const MIN_RETAINED_FILES: usize = 2;

/// Owns the corpus pool and the running model
pub struct CorpusManager {
    pool: Arc<BufferPool>,
    config: MarkovConfig,
    max_count: usize,
    model: RwLock<MarkovModel>,
    writer: Mutex<()>,
}

impl CorpusManager {
    /// Create a manager with an empty model; call [`CorpusManager::initialize`] before use
    pub fn new(pool: Arc<BufferPool>, config: MarkovConfig, max_count: usize) -> Self {
        let model = MarkovModel::new(config.state_size);
        Self {
            pool,
            config,
            max_count,
            model: RwLock::new(model),
            writer: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Path of the protected seed file, if one is configured
    pub fn seed_path(&self) -> Option<PathBuf> {
        self.config
            .seed_file
            .as_ref()
            .map(|name| self.pool.location().join(name))
    }

    /// Whether the running model has anything to generate from
    pub fn has_model(&self) -> bool {
        !self.model.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn build_from_disk(&self) -> Result<(MarkovModel, usize)> {
        let mut model = MarkovModel::new(self.config.state_size);
        let files = self.pool.list()?;
        for path in &files {
            model.combine(&self.model_for_file(path)?)?;
        }
        Ok((model, files.len()))
    }

    fn model_for_file(&self, path: &Path) -> Result<MarkovModel> {
        let bytes = std::fs::read(path)?;
        Ok(MarkovModel::from_text(
            &String::from_utf8_lossy(&bytes),
            self.config.state_size,
        ))
    }

    fn replace_model(&self, model: MarkovModel) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = model;
    }

    /// Build the running model from every corpus file, then prune
    pub fn initialize(&self) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let (model, files) = self.build_from_disk()?;
        let states = model.len();
        self.replace_model(model);
        self.pool.resync()?;
        info!("Markov model built from {} corpus files ({} states)", files, states);

        if let Some(seed) = self.seed_path() {
            if !seed.is_file() {
                warn!("Configured corpus seed {} does not exist", seed.display());
            }
        }

        self.prune_locked()
    }

    /// Store `text` as a new corpus file and fold it into the running model
    pub fn add_fragment(&self, text: &str) -> Result<PathBuf> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("No content provided".to_string()));
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let file_name = ResourceId::generate().stem("corpus");
        let path = self.pool.add(&file_name, text.as_bytes())?;

        let fragment = MarkovModel::from_text(text, self.config.state_size);
        self.model
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .combine(&fragment)?;
        info!("Corpus fragment saved to {}", path.display());

        self.prune_locked()?;
        Ok(path)
    }

    /// Delete the oldest corpus files while the pool is over capacity
    pub fn prune_corpus(&self) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune_locked()
    }

    fn prune_locked(&self) -> Result<()> {
        let seed = self.seed_path();
        let removed = self
            .pool
            .prune_oldest(self.max_count, MIN_RETAINED_FILES, seed.as_deref())?;

        if removed.is_empty() {
            return Ok(());
        }
        debug!("Pruned {} corpus files", removed.len());

        if self.config.rebuild_on_prune {
            let (model, files) = self.build_from_disk()?;
            self.replace_model(model);
            info!("Markov model rebuilt from {} retained corpus files", files);
        }
        Ok(())
    }

    /// Generate up to `count` sentences joined by spaces, ASCII only
    ///
    /// An empty result is a [`Error::Generation`], whose message starts with
    /// [`GENERATION_ERROR_PREFIX`].
    pub fn generate_sentences(&self, count: usize) -> Result<String> {
        let model = self.model.read().unwrap_or_else(PoisonError::into_inner);
        let mut rng = rand::thread_rng();

        let sentences: Vec<String> = (0..count)
            .filter_map(|_| model.make_sentence(&mut rng, self.config.max_sentence_words))
            .collect();
        let text: String = sentences.join(" ").chars().filter(char::is_ascii).collect();

        if text.trim().is_empty() {
            return Err(Error::Generation(
                "Unable to generate a sentence from the current corpus".to_string(),
            ));
        }
        Ok(text)
    }

    /// Generate `count` sentences, retrying once with the fallback count
    ///
    /// Never fails: the second failure's message is returned as the text.
    pub fn generate_with_fallback(&self, count: usize) -> String {
        with_fallback(count, self.config.fallback_sentences, |n| {
            self.generate_sentences(n)
        })
    }
}

/// Run `generate(count)`, and on failure run `generate(fallback)` exactly once
pub fn with_fallback<F>(count: usize, fallback: usize, mut generate: F) -> String
where
    F: FnMut(usize) -> Result<String>,
{
    match generate(count) {
        Ok(text) => text,
        Err(e) => {
            warn!("Generating {} sentences failed ({}), retrying with {}", count, e, fallback);
            generate(fallback).unwrap_or_else(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PoolName;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(max: usize, config: MarkovConfig) -> (TempDir, CorpusManager) {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(BufferPool::open(PoolName::Corpus, dir.path(), Some(max)).unwrap());
        (dir, CorpusManager::new(pool, config, max))
    }

    fn write_ordered(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, format!("Fragment {} text.", name)).unwrap();
                std::thread::sleep(Duration::from_millis(10));
                path
            })
            .collect()
    }

    #[test]
    fn test_initialize_builds_model_and_counts_files() {
        let (dir, mgr) = manager(10, MarkovConfig::default());
        write_ordered(dir.path(), &["a", "b", "c"]);

        mgr.initialize().unwrap();

        assert!(mgr.has_model());
        assert_eq!(mgr.pool().live_count(), 3);
    }

    #[test]
    fn test_initialize_prunes_oldest_first() {
        let (dir, mgr) = manager(2, MarkovConfig::default());
        let paths = write_ordered(dir.path(), &["old", "mid", "new", "newest"]);

        mgr.initialize().unwrap();

        assert_eq!(mgr.pool().list().unwrap(), {
            let mut kept = paths[2..].to_vec();
            kept.sort();
            kept
        });
        assert_eq!(mgr.pool().live_count(), 2);
    }

    #[test]
    fn test_prune_never_leaves_fewer_than_two() {
        let (dir, mgr) = manager(1, MarkovConfig::default());
        write_ordered(dir.path(), &["a", "b", "c", "d"]);

        mgr.initialize().unwrap();
        assert_eq!(mgr.pool().live_count(), 2);

        mgr.add_fragment("Another line of text.").unwrap();
        assert_eq!(mgr.pool().live_count(), 2);
    }

    #[test]
    fn test_seed_survives_even_when_oldest() {
        let config = MarkovConfig {
            seed_file: Some("seed.txt".to_string()),
            ..MarkovConfig::default()
        };
        let (dir, mgr) = manager(2, config);
        let paths = write_ordered(dir.path(), &["seed.txt", "b", "c", "d"]);

        mgr.initialize().unwrap();

        let remaining = mgr.pool().list().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&paths[0]));
        assert!(remaining.contains(&paths[3]));
    }

    #[test]
    fn test_add_fragment_rejects_empty_text() {
        let (_dir, mgr) = manager(5, MarkovConfig::default());
        assert!(matches!(mgr.add_fragment("  \n"), Err(Error::InvalidInput(_))));
        assert_eq!(mgr.pool().live_count(), 0);
    }

    #[test]
    fn test_add_fragment_feeds_generation() {
        let (_dir, mgr) = manager(5, MarkovConfig::default());
        mgr.initialize().unwrap();
        assert!(!mgr.has_model());

        let path = mgr.add_fragment("The owl hunts at night.").unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("corpus_"));

        let text = mgr.generate_sentences(2).unwrap();
        assert_eq!(text, "The owl hunts at night. The owl hunts at night.");
    }

    #[test]
    fn test_generation_on_empty_model_is_error_marker() {
        let (_dir, mgr) = manager(5, MarkovConfig::default());

        let err = mgr.generate_sentences(3).unwrap_err();
        assert!(err.to_string().starts_with(GENERATION_ERROR_PREFIX));
        assert!(mgr.generate_with_fallback(3).starts_with(GENERATION_ERROR_PREFIX));
    }

    #[test]
    fn test_output_is_ascii_only() {
        let (_dir, mgr) = manager(5, MarkovConfig::default());
        mgr.add_fragment("Caf\u{e9} na\u{ef}ve r\u{e9}sum\u{e9} today.").unwrap();

        let text = mgr.generate_sentences(1).unwrap();
        assert!(text.is_ascii());
        assert_eq!(text, "Caf nave rsum today.");
    }

    #[test]
    fn test_stale_model_without_rebuild() {
        let (_dir, mgr) = manager(2, MarkovConfig::default());
        mgr.add_fragment("Zebras roam far.").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        mgr.add_fragment("Owls hunt.").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        mgr.add_fragment("Owls sleep.").unwrap();

        // The zebra fragment is gone from disk but still in the model
        let contents: Vec<String> = mgr
            .pool()
            .list()
            .unwrap()
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert!(!contents.iter().any(|c| c.contains("Zebras")));

        let seen_zebra = (0..200).any(|_| mgr.generate_sentences(1).unwrap().contains("Zebras"));
        assert!(seen_zebra);
    }

    #[test]
    fn test_rebuild_on_prune_forgets_pruned_text() {
        let config = MarkovConfig {
            rebuild_on_prune: true,
            ..MarkovConfig::default()
        };
        let (_dir, mgr) = manager(2, config);
        mgr.add_fragment("Zebras roam far.").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        mgr.add_fragment("Owls hunt.").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        mgr.add_fragment("Owls sleep.").unwrap();

        for _ in 0..200 {
            assert!(!mgr.generate_sentences(1).unwrap().contains("Zebras"));
        }
    }

    #[test]
    fn test_fallback_runs_exactly_once() {
        let mut calls = Vec::new();
        let text = with_fallback(7, 3, |n| {
            calls.push(n);
            if n == 7 {
                Err(Error::Generation("empty".to_string()))
            } else {
                Ok("fallback text".to_string())
            }
        });
        assert_eq!(text, "fallback text");
        assert_eq!(calls, vec![7, 3]);
    }

    #[test]
    fn test_fallback_surfaces_second_error_verbatim() {
        let mut calls = 0;
        let text = with_fallback(5, 3, |_| {
            calls += 1;
            Err(Error::Generation("still empty".to_string()))
        });
        assert_eq!(text, "ERROR: still empty");
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_no_fallback_on_success() {
        let mut calls = 0;
        let text = with_fallback(5, 3, |_| {
            calls += 1;
            Ok("fine".to_string())
        });
        assert_eq!(text, "fine");
        assert_eq!(calls, 1);
    }
}
