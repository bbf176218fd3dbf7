//! # Artificial Inferno Common Library
//!
//! Shared code for the Artificial Inferno services including:
//! - Configuration schema and TOML loading
//! - Common error types
//! - Timestamp-based resource identifiers

pub mod config;
pub mod error;
pub mod time;

pub use config::TomlConfig;
pub use error::{Error, Result};
pub use time::ResourceId;
