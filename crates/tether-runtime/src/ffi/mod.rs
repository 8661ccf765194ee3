//! Foreign Function Interface (FFI) infrastructure
//!
//! Connects native code to the foreign runtime via:
//! - The runtime's call table (`Host`) and its raw handle types
//! - Call marshaling from typed closures to a uniform entry point
//! - The boundary trampoline that contains errors and panics
//! - Calls from native code back into the runtime
//! - The callback stack used for deferred work
//!
//! # Safety
//!
//! Raw handles are only meaningful to the runtime that produced them and
//! only on its thread. Everything that touches them takes an [`crate::Env`],
//! which cannot leave the runtime's thread.

pub mod callbacks;
pub mod caller;
pub mod host;
pub mod marshal;
pub mod safety;
pub mod types;

pub use callbacks::{Callback, CallbackHandle, CallbackStack, FireOutcome};
pub use caller::{Callee, IntoArgs};
pub use host::Host;
pub use marshal::{FromArgs, Marshal, MarshalWithEnv, MarshaledFunction};
pub use safety::{guard, raise};
pub use types::{ExitKind, Finalizer, RawValue, Subr};
