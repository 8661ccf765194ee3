//! Per-module session state
//!
//! A `Session` is created once when the module is loaded. It owns the
//! module configuration, defines the dedicated error symbol and keeps the
//! registry of persistent values waiting to be released on the foreign thread.

use crate::env::Env;
use crate::error::Result;
use crate::ffi::host::Host;
use crate::ffi::types::RawValue;
use crate::value::Symbol;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_config::ModuleConfig;
use tracing::{debug, trace};

/// Settings a session runs with
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Used as a prefix in channel names and log fields
    pub module_name: String,
    /// Symbol signaled for custom and unknown native errors
    pub error_symbol: String,
    /// Message the error symbol is defined with
    pub error_message: String,
    /// Release callback storage once a channel has nothing pending
    pub compact_when_empty: bool,
    /// Report callbacks discarded at channel tear-down
    pub warn_on_leak: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&ModuleConfig::default())
    }
}

impl From<&ModuleConfig> for SessionConfig {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            module_name: config.module_name().unwrap_or("tether").to_string(),
            error_symbol: config.error_symbol().to_string(),
            error_message: config.error_message().to_string(),
            compact_when_empty: config.compact_when_empty(),
            warn_on_leak: config.warn_on_leak(),
        }
    }
}

/// Persistent values dropped since the last entry into native code
///
/// Dropping a [`crate::GlobalValue`] may happen on any thread, but freeing the
/// global reference needs the runtime, so the handle is parked here until
/// the next well-defined drain point.
#[derive(Debug, Default)]
pub(crate) struct ReleaseQueue {
    pending: Mutex<Vec<RawValue>>,
}

impl ReleaseQueue {
    pub(crate) fn defer(&self, raw: RawValue) {
        self.pending.lock().push(raw);
    }

    /// Free every parked reference; returns how many were released
    pub(crate) fn drain(&self, host: &dyn Host) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        for raw in &pending {
            host.free_global_ref(*raw);
        }
        pending.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Module-wide state shared by every registered function and channel
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    releases: Arc<ReleaseQueue>,
    error_defined: AtomicBool,
}

impl Session {
    /// Create a session without touching the runtime
    pub fn new(config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            releases: Arc::new(ReleaseQueue::default()),
            error_defined: AtomicBool::new(false),
        })
    }

    /// Create a session and define its error symbol with the runtime
    pub fn start(host: &dyn Host, config: SessionConfig) -> Result<Arc<Self>> {
        let session = Self::new(config);
        session.enter(host).define_error_symbol()?;
        Ok(session)
    }

    /// Begin one entry into native code
    ///
    /// Parked persistent values are released before the env is handed out.
    pub fn enter<'h>(self: &'h Arc<Self>, host: &'h dyn Host) -> Env<'h> {
        let released = self.releases.drain(host);
        if released > 0 {
            trace!(released, "released persistent values");
        }
        Env::new(host, self)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Name of the dedicated error symbol
    pub fn error_symbol(&self) -> &str {
        &self.config.error_symbol
    }

    /// Persistent values waiting for the next drain point
    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    /// Release everything still parked; call when the module is unloaded
    pub fn shutdown(&self, host: &dyn Host) -> usize {
        let released = self.releases.drain(host);
        debug!(module = %self.config.module_name, released, "session shut down");
        released
    }

    pub(crate) fn releases(&self) -> &Arc<ReleaseQueue> {
        &self.releases
    }
}

impl<'e> Env<'e> {
    /// Register the session's error symbol; later calls are no-ops
    pub fn define_error_symbol(&'e self) -> Result<()> {
        let session = self.session();
        if session.error_defined.load(Ordering::Acquire) {
            return Ok(());
        }

        let config = session.config();
        self.call(
            "define-error",
            (
                Symbol::new(config.error_symbol.as_str()),
                config.error_message.as_str(),
            ),
        )?;
        session.error_defined.store(true, Ordering::Release);

        debug!(
            module = %config.module_name,
            symbol = %config.error_symbol,
            "error symbol defined"
        );
        Ok(())
    }
}
