//! Module configuration (tether.toml / ~/.tether/config.toml)
//!
//! Both the global and the project file share this schema; the loader merges
//! them section by section.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the dedicated error symbol signaled for native failures
pub const DEFAULT_ERROR_SYMBOL: &str = "tether-error";

/// Default message registered alongside the dedicated error symbol
pub const DEFAULT_ERROR_MESSAGE: &str = "Native module error";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Module configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Module identity and error reporting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleSection>,

    /// Channel behaviour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelConfig>,

    /// Logging output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// `[module]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModuleSection {
    /// Module name, used as the prefix of channel names in logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Symbol signaled for custom and unknown native errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_symbol: Option<String>,

    /// Message the error symbol is defined with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// `[channel]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Release callback storage once every pending callback has fired (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact_when_empty: Option<bool>,

    /// Log discarded callbacks when a channel is torn down (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_on_leak: Option<bool>,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Emit JSON lines instead of human-readable output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

impl ModuleConfig {
    /// Load module configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(module) = &self.module {
            if let Some(symbol) = &module.error_symbol {
                validate_symbol_name("module.error_symbol", symbol)?;
            }
            if let Some(name) = &module.name {
                if name.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "module.name".to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }
            }
        }

        if let Some(logging) = &self.logging {
            if let Some(level) = &logging.level {
                validate_log_level("logging.level", level)?;
            }
        }

        Ok(())
    }

    /// Get the global config file path (~/.tether/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".tether").join("config.toml"))
    }

    /// Merge another config into this one, field by field.
    /// Other config takes precedence for non-None values.
    pub fn merge(&mut self, other: &ModuleConfig) {
        if let Some(theirs) = &other.module {
            let ours = self.module.get_or_insert_with(Default::default);
            merge_field(&mut ours.name, &theirs.name);
            merge_field(&mut ours.error_symbol, &theirs.error_symbol);
            merge_field(&mut ours.error_message, &theirs.error_message);
        }
        if let Some(theirs) = &other.channel {
            let ours = self.channel.get_or_insert_with(Default::default);
            merge_field(&mut ours.compact_when_empty, &theirs.compact_when_empty);
            merge_field(&mut ours.warn_on_leak, &theirs.warn_on_leak);
        }
        if let Some(theirs) = &other.logging {
            let ours = self.logging.get_or_insert_with(Default::default);
            merge_field(&mut ours.level, &theirs.level);
            merge_field(&mut ours.json, &theirs.json);
        }
    }

    /// Module name, if configured
    pub fn module_name(&self) -> Option<&str> {
        self.module.as_ref().and_then(|m| m.name.as_deref())
    }

    /// Effective dedicated error symbol
    pub fn error_symbol(&self) -> &str {
        self.module
            .as_ref()
            .and_then(|m| m.error_symbol.as_deref())
            .unwrap_or(DEFAULT_ERROR_SYMBOL)
    }

    /// Effective error symbol message
    pub fn error_message(&self) -> &str {
        self.module
            .as_ref()
            .and_then(|m| m.error_message.as_deref())
            .unwrap_or(DEFAULT_ERROR_MESSAGE)
    }

    pub fn compact_when_empty(&self) -> bool {
        self.channel
            .as_ref()
            .and_then(|c| c.compact_when_empty)
            .unwrap_or(true)
    }

    pub fn warn_on_leak(&self) -> bool {
        self.channel
            .as_ref()
            .and_then(|c| c.warn_on_leak)
            .unwrap_or(true)
    }

    /// Effective log level name
    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_json(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

fn merge_field<T: Clone>(ours: &mut Option<T>, theirs: &Option<T>) {
    if theirs.is_some() {
        ours.clone_from(theirs);
    }
}

/// Symbols are interned by name on the foreign side; NUL and whitespace cannot round-trip.
pub(crate) fn validate_symbol_name(field: &str, value: &str) -> ConfigResult<()> {
    if value.is_empty() || value.chars().any(|c| c == '\0' || c.is_whitespace()) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a valid symbol name", value),
        });
    }
    Ok(())
}

pub(crate) fn validate_log_level(field: &str, value: &str) -> ConfigResult<()> {
    if !matches!(
        value.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!(
                "must be one of trace, debug, info, warn, error; got '{}'",
                value
            ),
        });
    }
    Ok(())
}
