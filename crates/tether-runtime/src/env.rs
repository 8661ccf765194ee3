//! Scoped access to the foreign runtime
//!
//! An `Env` wraps the runtime's call table for exactly one entry into native
//! code: one marshaled call or one channel drain step. Every primitive goes
//! through [`Env::check`], which turns a pending non-local exit into an
//! [`Error`] and clears it, so runtime faults are captured as values instead
//! of leaking into later calls.

use crate::error::{Error, Result};
use crate::ffi::host::Host;
use crate::ffi::types::{ExitKind, RawValue};
use crate::session::Session;
use crate::value::{GlobalValue, Value};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Capability handle for the current entry into native code
pub struct Env<'e> {
    host: &'e dyn Host,
    session: &'e Arc<Session>,
    /// Globals whose handles were given out during this entry
    held: RefCell<Vec<Arc<GlobalValue>>>,
}

impl<'e> Env<'e> {
    /// Wrap a host for one entry. Prefer [`Session::enter`], which also
    /// drains the release registry.
    pub fn new(host: &'e dyn Host, session: &'e Arc<Session>) -> Self {
        Self {
            host,
            session,
            held: RefCell::new(Vec::new()),
        }
    }

    pub fn host(&self) -> &'e dyn Host {
        self.host
    }

    pub fn session(&self) -> &'e Arc<Session> {
        self.session
    }

    /// Turn a pending non-local exit into an error
    pub(crate) fn check<T>(&self, result: T) -> Result<T> {
        match self.host.non_local_exit_check() {
            ExitKind::Return => Ok(result),
            _ => Err(self.take_exit()),
        }
    }

    fn take_exit(&self) -> Error {
        let (kind, first, second) = self.host.non_local_exit_get();
        self.host.non_local_exit_clear();
        match kind {
            ExitKind::Signal => Error::ForeignSignal {
                symbol: self.retain(first),
                data: self.retain(second),
            },
            ExitKind::Throw => Error::ForeignThrow {
                tag: self.retain(first),
                value: self.retain(second),
            },
            ExitKind::Return => Error::Unknown("non-local exit vanished".to_string()),
        }
    }

    fn retain(&self, raw: RawValue) -> GlobalValue {
        GlobalValue::new(
            self.host.make_global_ref(raw),
            self.session.releases().clone(),
        )
    }

    pub(crate) fn wrap(&'e self, raw: RawValue) -> Result<Value<'e>> {
        self.check(Value::new(raw, self))
    }

    /// Intern a symbol by name
    pub fn intern(&'e self, name: &str) -> Result<Value<'e>> {
        if name.is_empty() || name.contains('\0') {
            return Err(Error::InvalidIdentifier(name.to_string()));
        }
        self.wrap(self.host.intern(name))
    }

    pub fn nil(&'e self) -> Result<Value<'e>> {
        self.intern("nil")
    }

    pub fn t(&'e self) -> Result<Value<'e>> {
        self.intern("t")
    }

    pub fn int(&'e self, value: i64) -> Result<Value<'e>> {
        self.wrap(self.host.make_integer(value))
    }

    pub fn float(&'e self, value: f64) -> Result<Value<'e>> {
        self.wrap(self.host.make_float(value))
    }

    pub fn string(&'e self, value: &str) -> Result<Value<'e>> {
        self.wrap(self.host.make_string(value))
    }

    /// Build a foreign list from values
    pub fn list(&'e self, items: &[Value<'e>]) -> Result<Value<'e>> {
        self.call("list", items)
    }

    /// Name of a value's runtime type
    pub fn type_name(&'e self, value: Value<'e>) -> Result<String> {
        let ty = self.wrap(self.host.type_of(value.raw()))?;
        self.symbol_name(ty)
    }

    /// Name of a symbol; `WrongType` for anything else
    pub fn symbol_name(&'e self, symbol: Value<'e>) -> Result<String> {
        let name = self.call("symbol-name", [symbol])?;
        self.copy_string(name)
    }

    pub(crate) fn copy_string(&'e self, value: Value<'e>) -> Result<String> {
        let contents = self.host.copy_string_contents(value.raw());
        let contents = self.check(contents)?;
        contents.ok_or_else(|| Error::Unknown("string contents unavailable".to_string()))
    }

    /// Promote a value to persistent retention
    pub fn make_global(&'e self, value: Value<'e>) -> Result<GlobalValue> {
        let raw = self.host.make_global_ref(value.raw());
        self.check(GlobalValue::new(raw, self.session.releases().clone()))
    }

    /// Use a retained value for the rest of this entry
    ///
    /// The global stays alive until the env is dropped, so the returned handle
    /// cannot outlive its retention even if the caller's last reference goes
    /// away and a nested entry drains the release registry.
    pub(crate) fn hold(&'e self, global: Arc<GlobalValue>) -> Value<'e> {
        let raw = global.raw();
        self.held.borrow_mut().push(global);
        Value::new(raw, self)
    }

    /// Take a fresh retention of a borrowed global for the rest of this entry
    pub(crate) fn hold_copy(&'e self, global: &GlobalValue) -> Result<Value<'e>> {
        let copy = self.make_global(Value::new(global.raw(), self))?;
        Ok(self.hold(Arc::new(copy)))
    }

    /// Whether the runtime currently has a non-local exit pending
    pub fn pending_exit(&self) -> ExitKind {
        self.host.non_local_exit_check()
    }

    /// Raise a signal on the foreign side; takes effect when native code returns
    pub fn signal(&self, symbol: Value<'_>, data: Value<'_>) {
        self.host.non_local_exit_signal(symbol.raw(), data.raw());
    }

    /// Start a tagged non-local transfer on the foreign side
    pub fn throw(&self, tag: Value<'_>, value: Value<'_>) {
        self.host.non_local_exit_throw(tag.raw(), value.raw());
    }
}

impl fmt::Debug for Env<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("module", &self.session.config().module_name)
            .field("held", &self.held.borrow().len())
            .finish()
    }
}
