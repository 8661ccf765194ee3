//! Logging infrastructure - structured tracing for native modules
//!
//! Everything in the crate logs through `tracing`. A module installs the
//! subscriber once at load time; later calls are no-ops. Output goes to
//! stderr, since the runtime may own stdout.

use std::io;
use std::str::FromStr;
use std::sync::OnceLock;
use tether_config::ModuleConfig;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_spans: false,
        }
    }
}

impl From<&ModuleConfig> for LogConfig {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            // The config crate has already validated the level name
            level: Level::from_str(config.log_level()).unwrap_or(Level::INFO),
            json_format: config.log_json(),
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging a module
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            json_format: false,
            show_spans: true,
        }
    }
}

/// Initialize logging from a module configuration
pub fn init(config: &ModuleConfig) {
    init_with_config(LogConfig::from(config));
}

/// Initialize logging with custom configuration
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "tether_runtime={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let registry = tracing_subscriber::registry().with(env_filter);
        // Another subscriber may already be installed by the host process
        let _ = if config.json_format {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_span_events(span_events),
                )
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_span_events(span_events)
                        .with_target(true)
                        .with_thread_ids(cfg!(debug_assertions)),
                )
                .try_init()
        };
    });
}

/// Whether logging has been initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}
