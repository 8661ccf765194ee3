//! Public embedding API for native modules
//!
//! This module provides what a module author works with:
//! - Value conversion between Rust and foreign types
//! - Function registration with arity derived from closure signatures
//! - Native values stored in the runtime as user pointers
//! - Thread-safe data snapshots for deferred callbacks
//!
//! # Examples
//!
//! ```
//! use tether_runtime::api::{FunctionBuilder, Opaque};
//! use tether_runtime::loopback::Loopback;
//! use tether_runtime::{Result, Session, SessionConfig};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! let host = Loopback::new();
//! let session = Session::start(&host, SessionConfig::default()).unwrap();
//! let env = session.enter(&host);
//!
//! FunctionBuilder::new("counter-new")
//!     .build(&env, || -> Result<Opaque<AtomicU64>> { Ok(Opaque::new(AtomicU64::new(0))) })
//!     .unwrap();
//! FunctionBuilder::new("counter-bump")
//!     .build(&env, |c: Opaque<AtomicU64>| -> Result<u64> {
//!         Ok(c.fetch_add(1, Ordering::SeqCst) + 1)
//!     })
//!     .unwrap();
//!
//! let counter = host.call("counter-new", &[]).unwrap();
//! host.call("counter-bump", &[counter]).unwrap();
//! let two = host.call("counter-bump", &[counter]).unwrap();
//! assert_eq!(host.integer(two), Some(2));
//! ```

pub mod conversion;
pub mod datum;
pub mod native;
pub mod opaque;

// Re-export main types for convenience
pub use conversion::{FromForeign, IntoForeign};
pub use datum::Datum;
pub use native::FunctionBuilder;
pub use opaque::Opaque;
