//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::module::{validate_log_level, validate_symbol_name, ModuleConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file
pub const PROJECT_CONFIG_FILE: &str = "tether.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.tether/config.toml) - lowest priority
/// 2. Project config (./tether.toml) - overrides global
/// 3. Environment variables (TETHER_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective (merged) configuration
    pub module: ModuleConfig,

    /// Directory where tether.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.tether/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find tether.toml, merges it over the
    /// global config if one exists, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        let mut module = self.load_global_config()?;
        module.merge(&project_config);
        let module = self.apply_env_overrides(module)?;

        Ok(Config {
            module,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ModuleConfig::load_from_file(config_path)?;

        let mut module = self.load_global_config()?;
        module.merge(&project_config);
        let module = self.apply_env_overrides(module)?;

        Ok(Config {
            module,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ModuleConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ModuleConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ModuleConfig::default())),
            }
        }
    }

    /// Load global configuration; a missing file (or home directory) means defaults
    fn load_global_config(&mut self) -> ConfigResult<ModuleConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match ModuleConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(ConfigError::HomeNotFound) => return Ok(ModuleConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(ModuleConfig::default());
        }

        ModuleConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognised: TETHER_ERROR_SYMBOL, TETHER_LOG_LEVEL, TETHER_LOG_JSON
    fn apply_env_overrides(&self, mut config: ModuleConfig) -> ConfigResult<ModuleConfig> {
        if let Ok(symbol) = env::var("TETHER_ERROR_SYMBOL") {
            validate_symbol_name("TETHER_ERROR_SYMBOL", &symbol)?;
            config
                .module
                .get_or_insert_with(Default::default)
                .error_symbol = Some(symbol);
        }

        if let Ok(level) = env::var("TETHER_LOG_LEVEL") {
            validate_log_level("TETHER_LOG_LEVEL", &level)?;
            config.logging.get_or_insert_with(Default::default).level = Some(level.to_lowercase());
        }

        if let Ok(json) = env::var("TETHER_LOG_JSON") {
            let json_bool = matches!(json.to_lowercase().as_str(), "true" | "1" | "yes");
            config.logging.get_or_insert_with(Default::default).json = Some(json_bool);
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a tether.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

impl Deref for Config {
    type Target = ModuleConfig;

    fn deref(&self) -> &ModuleConfig {
        &self.module
    }
}
