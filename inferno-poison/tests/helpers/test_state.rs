//! Application state over temporary storage

use inferno_common::config::{LimitsConfig, StorageConfig};
use inferno_common::TomlConfig;
use inferno_poison::buffer::{BufferPool, PoolName};
use inferno_poison::AppState;
use std::sync::Arc;
use tempfile::TempDir;

/// Multipart boundary used by [`multipart_body`]
pub const BOUNDARY: &str = "inferno-test-boundary";

/// An initialized AppState whose pools live in a temporary directory
pub struct TestState {
    pub dir: TempDir,
    pub config: TomlConfig,
    pub state: AppState,
}

impl TestState {
    /// Default configuration with a short deletion delay
    pub fn new() -> Self {
        Self::with_limits(LimitsConfig {
            file_deletion_delay_secs: 1,
            ..LimitsConfig::default()
        })
    }

    pub fn with_limits(limits: LimitsConfig) -> Self {
        Self::with_config(|config| config.limits = limits)
    }

    /// Start from the defaults, apply `customize`, then open and initialize
    pub fn with_config(customize: impl FnOnce(&mut TomlConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = TomlConfig {
            storage: StorageConfig::rooted_at(dir.path()),
            ..TomlConfig::default()
        };
        customize(&mut config);
        config.storage.ensure_directories().unwrap();

        let state = AppState::from_config(&config).unwrap();
        state.initialize().unwrap();
        Self { dir, config, state }
    }

    pub fn pool(&self, name: PoolName) -> &Arc<BufferPool> {
        self.state.lifecycle.buffers().get(name)
    }

    pub fn count(&self, name: PoolName) -> usize {
        self.pool(name).live_count()
    }

    /// Files actually on disk in `name`
    pub fn files(&self, name: PoolName) -> usize {
        self.pool(name).list().unwrap().len()
    }
}

/// Single-file multipart body for `field`
pub fn multipart_body(field: &str, filename: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}
