//! The foreign runtime's call table
//!
//! `Host` is the capability object the rest of the crate consumes. Every
//! primitive follows the runtime's own error convention: on failure it sets a
//! pending non-local exit and returns an unspecified value. Callers must
//! query [`Host::non_local_exit_check`] afterwards; [`crate::Env`] does that
//! for every call it makes.

use crate::ffi::types::{ExitKind, Finalizer, RawValue, Subr};
use std::io;
use std::os::raw::c_void;

/// Primitives provided by the foreign runtime for one entry into native code
pub trait Host {
    /// Intern a symbol by name
    fn intern(&self, name: &str) -> RawValue;

    /// The symbol naming the value's runtime type
    fn type_of(&self, value: RawValue) -> RawValue;

    fn is_not_nil(&self, value: RawValue) -> bool;

    /// Identity comparison
    fn eq(&self, a: RawValue, b: RawValue) -> bool;

    fn make_integer(&self, value: i64) -> RawValue;

    fn extract_integer(&self, value: RawValue) -> i64;

    fn make_float(&self, value: f64) -> RawValue;

    fn extract_float(&self, value: RawValue) -> f64;

    fn make_string(&self, value: &str) -> RawValue;

    /// Copy out a string's contents; `None` with a pending signal on failure
    fn copy_string_contents(&self, value: RawValue) -> Option<String>;

    /// Wrap a native pointer; the runtime calls `finalizer` once when it frees the value
    fn make_user_ptr(&self, finalizer: Option<Finalizer>, ptr: *mut c_void) -> RawValue;

    fn get_user_ptr(&self, value: RawValue) -> *mut c_void;

    fn get_user_finalizer(&self, value: RawValue) -> Option<Finalizer>;

    /// Create a function value accepting `min_arity..=max_arity` arguments
    fn make_function(
        &self,
        min_arity: usize,
        max_arity: usize,
        doc: Option<&str>,
        subr: Subr,
    ) -> RawValue;

    /// Call a function value (or a symbol naming one)
    fn funcall(&self, function: RawValue, args: &[RawValue]) -> RawValue;

    fn non_local_exit_check(&self) -> ExitKind;

    /// Pending exit kind with its symbol/tag and data/value
    fn non_local_exit_get(&self) -> (ExitKind, RawValue, RawValue);

    fn non_local_exit_clear(&self);

    fn non_local_exit_signal(&self, symbol: RawValue, data: RawValue);

    fn non_local_exit_throw(&self, tag: RawValue, value: RawValue);

    /// Retain a value beyond the current entry
    fn make_global_ref(&self, value: RawValue) -> RawValue;

    fn free_global_ref(&self, value: RawValue);

    /// Create a one-directional notification pipe
    ///
    /// The runtime's main loop reads what is written to the returned sink and
    /// calls `relay` with each newly arrived chunk of text.
    fn open_channel(&self, relay: RawValue) -> io::Result<Box<dyn io::Write + Send>>;
}
