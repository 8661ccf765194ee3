//! Foreign values as seen from native code
//!
//! - `Value<'e>`: a handle valid only while the env it came from is alive
//! - `GlobalValue`: a handle promoted to persistent retention
//! - `Symbol`: a native stand-in for an interned symbol name

use crate::api::conversion::{FromForeign, IntoForeign};
use crate::env::Env;
use crate::error::Result;
use crate::ffi::types::RawValue;
use crate::session::ReleaseQueue;
use std::fmt;
use std::sync::Arc;

/// Handle to a value owned by the foreign runtime
///
/// The `'e` lifetime ties the handle to the [`Env`] of the current entry, so
/// it cannot be kept past the call or drain step that produced it. Use
/// [`Value::make_global`] to retain it longer.
#[derive(Clone, Copy)]
pub struct Value<'e> {
    raw: RawValue,
    env: &'e Env<'e>,
}

impl<'e> Value<'e> {
    pub(crate) fn new(raw: RawValue, env: &'e Env<'e>) -> Self {
        Self { raw, env }
    }

    /// The underlying runtime handle
    pub fn raw(&self) -> RawValue {
        self.raw
    }

    pub fn env(&self) -> &'e Env<'e> {
        self.env
    }

    pub fn is_not_nil(&self) -> bool {
        self.env.host().is_not_nil(self.raw)
    }

    pub fn is_nil(&self) -> bool {
        !self.is_not_nil()
    }

    /// Identity comparison through the runtime
    pub fn is_eq(&self, other: Value<'_>) -> bool {
        self.env.host().eq(self.raw, other.raw)
    }

    /// Name of the runtime type, e.g. `"integer"` or `"user-ptr"`
    pub fn type_name(&self) -> Result<String> {
        self.env.type_name(*self)
    }

    /// Convert into a native type
    pub fn into_rust<T: FromForeign>(self) -> Result<T> {
        T::from_foreign(self)
    }

    /// Promote to a persistent value
    pub fn make_global(self) -> Result<GlobalValue> {
        self.env.make_global(self)
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.raw).finish()
    }
}

/// A foreign value retained beyond its originating entry
///
/// Dropping it never calls into the runtime directly (it may be dropped on any
/// thread); the global reference is parked in the session's release registry
/// and freed at the next entry into native code.
pub struct GlobalValue {
    raw: RawValue,
    releases: Arc<ReleaseQueue>,
}

impl GlobalValue {
    pub(crate) fn new(raw: RawValue, releases: Arc<ReleaseQueue>) -> Self {
        Self { raw, releases }
    }

    /// Use the value within an entry, for as long as `self` is borrowed
    ///
    /// To hand the value on after giving up the global, convert it with
    /// [`IntoForeign`], which keeps it retained until the entry ends.
    pub fn bind<'e>(&'e self, env: &'e Env<'e>) -> Value<'e> {
        Value::new(self.raw, env)
    }

    pub fn raw(&self) -> RawValue {
        self.raw
    }
}

impl Drop for GlobalValue {
    fn drop(&mut self) {
        self.releases.defer(self.raw);
    }
}

impl fmt::Debug for GlobalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalValue").field(&self.raw).finish()
    }
}

/// A symbol, carried natively by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl IntoForeign for Symbol {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.intern(&self.0)
    }
}

impl FromForeign for Symbol {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        value.env().symbol_name(value).map(Symbol)
    }
}
