//! Configuration schema, TOML loading and storage path resolution
//!
//! Resolution priority for the config file:
//! 1. Explicit path (command-line argument or `INFERNO_CONFIG`)
//! 2. `~/.config/inferno/config.toml`
//! 3. Compiled defaults (a missing default file is not an error)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound for caller-facing counts (sentences, audio chunks)
pub const MAX_REQUEST_COUNT: usize = 100;

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub audio: AudioConfig,
    pub markov: MarkovConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Storage locations of every buffer pool
///
/// Relative pool directories are resolved against `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub image_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub intake_dir: PathBuf,
    pub delivery_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            image_dir: PathBuf::from("images"),
            audio_dir: PathBuf::from("audio"),
            corpus_dir: PathBuf::from("corpora"),
            intake_dir: PathBuf::from("intake"),
            delivery_dir: PathBuf::from("delivery"),
        }
    }
}

/// Fully resolved pool directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub corpus: PathBuf,
    pub intake: PathBuf,
    pub delivery: PathBuf,
}

impl StorageConfig {
    /// Storage rooted entirely under `root` with the default directory names
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        }
    }

    /// Resolve every pool directory against the storage root
    pub fn paths(&self) -> StoragePaths {
        StoragePaths {
            image: self.resolve(&self.image_dir),
            audio: self.resolve(&self.audio_dir),
            corpus: self.resolve(&self.corpus_dir),
            intake: self.resolve(&self.intake_dir),
            delivery: self.resolve(&self.delivery_dir),
        }
    }

    /// Create any missing pool directory
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in self.paths().all() {
            if !dir.is_dir() {
                std::fs::create_dir_all(dir)?;
                info!("Created pool directory {}", dir.display());
            }
        }
        Ok(())
    }
}

impl StoragePaths {
    /// All pool directories in a stable order
    pub fn all(&self) -> [&Path; 5] {
        [
            &self.image,
            &self.audio,
            &self.corpus,
            &self.intake,
            &self.delivery,
        ]
    }
}

/// Pool capacities and the post-serve deletion delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// One slot is reserved for the seed corpus, the rest are user-generated
    pub corpus_max_count: usize,
    pub image_max_count: usize,
    pub audio_max_count: usize,
    pub file_deletion_delay_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            corpus_max_count: 10_001,
            image_max_count: 50,
            audio_max_count: 50,
            file_deletion_delay_secs: 30,
        }
    }
}

impl LimitsConfig {
    /// Delay between serving a resource and deleting its staged copy
    pub fn file_deletion_delay(&self) -> Duration {
        Duration::from_secs(self.file_deletion_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Length of each stored audio chunk in milliseconds
    pub chunk_length_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_length_ms: 1000,
        }
    }
}

/// Markov text generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkovConfig {
    /// Number of preceding words each transition is keyed on
    pub state_size: usize,
    /// Sentence count used for the single retry after an empty generation
    pub fallback_sentences: usize,
    /// Walks longer than this are abandoned
    pub max_sentence_words: usize,
    /// Corpus file that pruning must never delete
    pub seed_file: Option<String>,
    /// Rebuild the running model from disk after a prune removed files
    pub rebuild_on_prune: bool,
}

impl Default for MarkovConfig {
    fn default() -> Self {
        Self {
            state_size: 2,
            fallback_sentences: 3,
            max_sentence_words: 200,
            seed_file: None,
            rebuild_on_prune: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Reject settings the buffer engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        for (name, value) in [
            ("limits.corpus_max_count", limits.corpus_max_count),
            ("limits.image_max_count", limits.image_max_count),
            ("limits.audio_max_count", limits.audio_max_count),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be at least 1", name)));
            }
        }

        if self.audio.chunk_length_ms == 0 {
            return Err(Error::Config(
                "audio.chunk_length_ms must be at least 1".to_string(),
            ));
        }

        if self.markov.state_size == 0 {
            return Err(Error::Config(
                "markov.state_size must be at least 1".to_string(),
            ));
        }

        if !(1..=MAX_REQUEST_COUNT).contains(&self.markov.fallback_sentences) {
            return Err(Error::Config(format!(
                "markov.fallback_sentences must be within 1..={}",
                MAX_REQUEST_COUNT
            )));
        }

        if let Some(seed) = &self.markov.seed_file {
            if seed.is_empty() || seed.contains('/') || seed.contains('\\') {
                return Err(Error::Config(format!(
                    "markov.seed_file must be a bare file name, got {:?}",
                    seed
                )));
            }
        }

        Ok(())
    }
}

/// Default config file location (`~/.config/inferno/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("inferno").join("config.toml"))
}

/// Parse and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Resolve configuration using the standard priority order
pub fn resolve_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    resolve_config_with_default(explicit, default_config_path().as_deref())
}

/// Resolve configuration with an explicit fallback location
///
/// An explicit path that cannot be read is an error. A missing default file falls back
/// to compiled defaults with a warning.
pub fn resolve_config_with_default(
    explicit: Option<&Path>,
    default_path: Option<&Path>,
) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        info!("Loading configuration from {}", path.display());
        return load_toml_config(path);
    }

    match default_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(path)
        }
        _ => {
            warn!("No configuration file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}
