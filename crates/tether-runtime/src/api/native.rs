//! Native function registration and builder
//!
//! Registers Rust closures as functions the foreign runtime can call. The
//! arity is taken from the closure's signature and declared to the runtime as
//! both minimum and maximum. Named functions are bound to their symbol with
//! `defalias`; anonymous ones are only returned as values.
//!
//! # Examples
//!
//! ```
//! use tether_runtime::api::FunctionBuilder;
//! use tether_runtime::loopback::Loopback;
//! use tether_runtime::{Env, Error, Result, Session, SessionConfig};
//!
//! let host = Loopback::new();
//! let session = Session::start(&host, SessionConfig::default()).unwrap();
//! let env = session.enter(&host);
//!
//! // Plain closure
//! FunctionBuilder::new("add")
//!     .doc("Add two integers.")
//!     .build(&env, |x: i64, y: i64| -> Result<i64> { Ok(x + y) })
//!     .unwrap();
//!
//! // Closure that also talks to the runtime
//! FunctionBuilder::new("pair-up")
//!     .build_with_env(&env, |env: &Env<'_>, x: i64| -> Result<String> {
//!         let pair = env.call("cons", (x, x))?;
//!         pair.type_name()
//!     })
//!     .unwrap();
//!
//! // Failing closure: the caller sees a signal carrying the message
//! FunctionBuilder::new("always-fails")
//!     .build(&env, |n: i64| -> Result<()> { Err(Error::custom(format!("Got {}!", n))) })
//!     .unwrap();
//! ```

use crate::env::Env;
use crate::error::Result;
use crate::ffi::marshal::{Marshal, MarshalWithEnv, MarshaledFunction};
use crate::ffi::safety::trampoline;
use crate::value::{Symbol, Value};
use crate::Error;
use tracing::debug;

/// Builder for registering native functions with the foreign runtime
#[derive(Debug, Clone, Default)]
pub struct FunctionBuilder {
    name: Option<String>,
    doc: Option<String>,
}

impl FunctionBuilder {
    /// Register under `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            doc: None,
        }
    }

    /// Register without binding a symbol
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Attach a documentation string
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Register a closure `Fn(A, B, ..) -> Result<R>`
    ///
    /// Returns the function value.
    pub fn build<'e, Args, F>(self, env: &'e Env<'e>, f: F) -> Result<Value<'e>>
    where
        F: Marshal<Args>,
    {
        self.register(env, f.into_marshaled())
    }

    /// Register a closure `Fn(&Env, A, B, ..) -> Result<R>`
    pub fn build_with_env<'e, Args, F>(self, env: &'e Env<'e>, f: F) -> Result<Value<'e>>
    where
        F: MarshalWithEnv<Args>,
    {
        self.register(env, f.into_marshaled_with_env())
    }

    /// Register an already marshaled function
    pub fn register<'e>(self, env: &'e Env<'e>, function: MarshaledFunction) -> Result<Value<'e>> {
        if let Some(name) = &self.name {
            if name.is_empty() || name.contains('\0') {
                return Err(Error::InvalidIdentifier(name.clone()));
            }
        }

        let arity = function.arity();
        let label = self.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let subr = trampoline(env.session().clone(), label, function);
        let raw = env
            .host()
            .make_function(arity, arity, self.doc.as_deref(), subr);
        let value = env.wrap(raw)?;

        if let Some(name) = self.name {
            env.call("defalias", (Symbol::new(name.as_str()), value))?;
            debug!(function = %name, arity, "registered native function");
        }
        Ok(value)
    }
}
