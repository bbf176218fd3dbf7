//! Tests for configuration loading, defaults and storage path resolution

use inferno_common::config::{
    load_toml_config, resolve_config_with_default, StorageConfig, TomlConfig,
};
use inferno_common::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_defaults_match_documented_values() {
    let config = TomlConfig::default();

    assert_eq!(config.server.port, 5000);
    assert_eq!(config.limits.corpus_max_count, 10_001);
    assert_eq!(config.limits.image_max_count, 50);
    assert_eq!(config.limits.audio_max_count, 50);
    assert_eq!(config.limits.file_deletion_delay(), Duration::from_secs(30));
    assert_eq!(config.audio.chunk_length_ms, 1000);
    assert_eq!(config.markov.state_size, 2);
    assert_eq!(config.markov.fallback_sentences, 3);
    assert!(config.markov.seed_file.is_none());
    assert!(!config.markov.rebuild_on_prune);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_keys() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [limits]
        image_max_count = 5
        file_deletion_delay_secs = 2

        [markov]
        seed_file = "seed.txt"
        "#,
    );

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.limits.image_max_count, 5);
    assert_eq!(config.limits.audio_max_count, 50);
    assert_eq!(config.limits.file_deletion_delay(), Duration::from_secs(2));
    assert_eq!(config.markov.seed_file.as_deref(), Some("seed.txt"));
    assert_eq!(config.server.port, 5000);
}

#[test]
fn test_relative_pool_dirs_resolve_against_root() {
    let storage = StorageConfig::rooted_at("/srv/inferno");
    let paths = storage.paths();

    assert_eq!(paths.image, Path::new("/srv/inferno/images"));
    assert_eq!(paths.audio, Path::new("/srv/inferno/audio"));
    assert_eq!(paths.corpus, Path::new("/srv/inferno/corpora"));
    assert_eq!(paths.intake, Path::new("/srv/inferno/intake"));
    assert_eq!(paths.delivery, Path::new("/srv/inferno/delivery"));
}

#[test]
fn test_absolute_pool_dir_is_kept() {
    let mut storage = StorageConfig::rooted_at("/srv/inferno");
    storage.audio_dir = PathBuf::from("/mnt/fast/audio");

    assert_eq!(storage.paths().audio, Path::new("/mnt/fast/audio"));
}

#[test]
fn test_ensure_directories_creates_all_pools() {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig::rooted_at(dir.path());

    storage.ensure_directories().unwrap();

    for pool_dir in storage.paths().all() {
        assert!(pool_dir.is_dir(), "{} should exist", pool_dir.display());
    }
}

#[test]
fn test_zero_capacity_rejected() {
    let mut config = TomlConfig::default();
    config.limits.audio_max_count = 0;

    match config.validate() {
        Err(Error::Config(msg)) => assert!(msg.contains("audio_max_count")),
        other => panic!("Expected config error, got {:?}", other),
    }
}

#[test]
fn test_zero_chunk_length_rejected() {
    let mut config = TomlConfig::default();
    config.audio.chunk_length_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_fallback_sentences_out_of_range_rejected() {
    let mut config = TomlConfig::default();
    config.markov.fallback_sentences = 101;
    assert!(config.validate().is_err());

    config.markov.fallback_sentences = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_seed_file_with_separator_rejected() {
    let mut config = TomlConfig::default();
    config.markov.seed_file = Some("../seed.txt".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[limits\nimage_max_count = ");

    assert!(matches!(load_toml_config(&path), Err(Error::Toml(_))));
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(resolve_config_with_default(Some(&missing), None).is_err());
}

#[test]
fn test_missing_default_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("config.toml");

    let config = resolve_config_with_default(None, Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_default_file_used_when_present() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[server]\nport = 8080\n");

    let config = resolve_config_with_default(None, Some(&path)).unwrap();
    assert_eq!(config.server.port, 8080);
}
