//! Tether Runtime - typed native functions for a single-threaded foreign runtime
//!
//! This library lets Rust code expose statically-typed functions to a
//! dynamically-typed foreign caller and lets background work call back into
//! that caller safely:
//! - Value conversion between native types and foreign values
//! - Arity-checked function marshaling with error and panic containment
//! - Calling foreign functions from native code
//! - Channels that deliver callbacks from any thread onto the foreign thread
//!
//! # Example
//!
//! ```
//! use tether_runtime::api::FunctionBuilder;
//! use tether_runtime::loopback::Loopback;
//! use tether_runtime::{Result, Session, SessionConfig};
//!
//! let host = Loopback::new();
//! let session = Session::start(&host, SessionConfig::default()).unwrap();
//! let env = session.enter(&host);
//!
//! FunctionBuilder::new("add")
//!     .build(&env, |x: i64, y: i64| -> Result<i64> { Ok(x + y) })
//!     .unwrap();
//!
//! let five = host.call("add", &[host.make_int(2), host.make_int(3)]).unwrap();
//! assert_eq!(host.integer(five), Some(5));
//! ```

/// Tether runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod async_runtime;
pub mod env;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod loopback;
pub mod session;
pub mod value;

// Re-export commonly used types
pub use api::{Datum, FromForeign, FunctionBuilder, IntoForeign, Opaque};
pub use async_runtime::{Channel, ChannelState};
pub use env::Env;
pub use error::{Error, Result};
pub use ffi::{Callback, CallbackHandle, CallbackStack, FireOutcome, Host, RawValue};
pub use session::{Session, SessionConfig};
pub use value::{GlobalValue, Symbol, Value};
