//! Tether Configuration System
//!
//! Provides configuration for modules built on `tether-runtime`:
//! - Module settings (name, dedicated error symbol)
//! - Channel behaviour (storage compaction, leak reporting)
//! - Logging (level, output format)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.tether/config.toml)
//! 2. Project config (nearest ./tether.toml)
//! 3. Environment variables (TETHER_*)
//!
//! # Example
//!
//! ```no_run
//! use tether_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("error symbol: {}", config.error_symbol());
//! ```

pub mod loader;
pub mod module;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use module::{ChannelConfig, LoggingConfig, ModuleConfig, ModuleSection};
