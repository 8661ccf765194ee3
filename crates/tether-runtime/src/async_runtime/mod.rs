//! Async bridge to the foreign runtime's thread
//!
//! This module connects background work to the single-threaded runtime:
//! - Channels that carry callbacks onto the runtime's thread
//! - The notification framing used on the channel transport
//! - Tokio integration for spawning work whose result becomes a callback
//!
//! The foreign runtime never drives tokio itself, so background tasks run on
//! a dedicated multi-threaded tokio runtime created on first use.

pub mod channel;
pub mod notify;
pub mod task;

pub use channel::{Channel, ChannelState};
pub use notify::NotificationDecoder;

use std::io;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

/// Global tokio runtime for background work
static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get the global tokio runtime, creating it on first use
pub fn runtime() -> io::Result<&'static Runtime> {
    if let Some(runtime) = TOKIO_RUNTIME.get() {
        return Ok(runtime);
    }

    let built = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("tether-worker")
        .enable_all()
        .build()?;
    // A concurrent caller may have won; the spare runtime is dropped unused
    Ok(TOKIO_RUNTIME.get_or_init(|| built))
}
