//! Calling foreign functions from native code
//!
//! The callee is named by a symbol, a function value or a retained value;
//! arguments are anything that converts into foreign values. A pending exit
//! after the call comes back as an error and is cleared, so native code can
//! inspect it, recover, or propagate it with `?` (the boundary re-raises
//! foreign signals verbatim).

use crate::api::conversion::{FromForeign, IntoForeign};
use crate::env::Env;
use crate::error::Result;
use crate::ffi::types::RawValue;
use crate::value::{GlobalValue, Symbol, Value};
use std::sync::Arc;
use tracing::trace;

/// Something that designates a foreign function
pub trait Callee {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>>;
}

impl Callee for &str {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.intern(self)
    }
}

impl Callee for String {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.intern(self)
    }
}

impl Callee for &Symbol {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.intern(self.name())
    }
}

impl Callee for Value<'_> {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(Value::new(self.raw(), env))
    }
}

impl Callee for &GlobalValue {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.hold_copy(self)
    }
}

impl Callee for Arc<GlobalValue> {
    fn resolve<'e>(&self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(env.hold(Arc::clone(self)))
    }
}

/// An argument list for a foreign call
pub trait IntoArgs {
    /// Convert every argument, stopping at the first failure
    fn into_args<'e>(self, env: &'e Env<'e>) -> Result<Vec<Value<'e>>>;
}

impl IntoArgs for () {
    fn into_args<'e>(self, _env: &'e Env<'e>) -> Result<Vec<Value<'e>>> {
        Ok(Vec::new())
    }
}

macro_rules! impl_into_args {
    ($($T:ident $t:ident),+) => {
        impl<$($T: IntoForeign,)+> IntoArgs for ($($T,)+) {
            fn into_args<'e>(self, env: &'e Env<'e>) -> Result<Vec<Value<'e>>> {
                let ($($t,)+) = self;
                Ok(vec![$($t.into_foreign(env)?),+])
            }
        }
    };
}

impl_into_args!(A a);
impl_into_args!(A a, B b);
impl_into_args!(A a, B b, C c);
impl_into_args!(A a, B b, C c, D d);
impl_into_args!(A a, B b, C c, D d, E e);
impl_into_args!(A a, B b, C c, D d, E e, F f);
impl_into_args!(A a, B b, C c, D d, E e, F f, G g);
impl_into_args!(A a, B b, C c, D d, E e, F f, G g, H h);

impl<T: IntoForeign, const N: usize> IntoArgs for [T; N] {
    fn into_args<'e>(self, env: &'e Env<'e>) -> Result<Vec<Value<'e>>> {
        self.into_iter().map(|arg| arg.into_foreign(env)).collect()
    }
}

impl<T: IntoForeign> IntoArgs for Vec<T> {
    fn into_args<'e>(self, env: &'e Env<'e>) -> Result<Vec<Value<'e>>> {
        self.into_iter().map(|arg| arg.into_foreign(env)).collect()
    }
}

impl IntoArgs for &[Value<'_>] {
    fn into_args<'e>(self, env: &'e Env<'e>) -> Result<Vec<Value<'e>>> {
        Ok(self.iter().map(|arg| Value::new(arg.raw(), env)).collect())
    }
}

impl<'e> Env<'e> {
    /// Call a foreign function
    ///
    /// # Examples
    ///
    /// ```
    /// # use tether_runtime::loopback::Loopback;
    /// # use tether_runtime::{Session, SessionConfig};
    /// # let host = Loopback::new();
    /// # let session = Session::new(SessionConfig::default());
    /// let env = session.enter(&host);
    /// let pair = env.call("cons", (1_i64, "one")).unwrap();
    /// assert_eq!(pair.type_name().unwrap(), "cons");
    /// ```
    pub fn call(&'e self, callee: impl Callee, args: impl IntoArgs) -> Result<Value<'e>> {
        let function = callee.resolve(self)?;
        let args = args.into_args(self)?;
        let raw: Vec<RawValue> = args.iter().map(Value::raw).collect();
        trace!(function = ?function.raw(), arity = raw.len(), "foreign call");
        self.wrap(self.host().funcall(function.raw(), &raw))
    }

    /// Call a foreign function and convert its result
    pub fn call_as<T: FromForeign>(&'e self, callee: impl Callee, args: impl IntoArgs) -> Result<T> {
        self.call(callee, args)?.into_rust()
    }
}

impl<'e> Value<'e> {
    /// Call this value as a function
    pub fn call(self, args: impl IntoArgs) -> Result<Value<'e>> {
        self.env().call(self, args)
    }
}
