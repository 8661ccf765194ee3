//! The boundary between the foreign runtime and native code
//!
//! Every registered function runs through [`trampoline`]: it opens an entry,
//! wraps the raw arguments, runs the marshaled function with panics caught,
//! and turns any failure into exactly one foreign non-local exit. Nothing
//! unwinds across the boundary.
//!
//! | native error | foreign effect |
//! |---|---|
//! | `WrongType` | `wrong-type-argument` with `(expected actual value)` |
//! | `ForeignSignal` / `ForeignThrow` | re-raised verbatim |
//! | `Arity` | process abort (the registered arity was violated) |
//! | anything else, panics included | the session's error symbol with `(message)` |

use crate::api::conversion::IntoForeign;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::ffi::host::Host;
use crate::ffi::marshal::MarshaledFunction;
use crate::ffi::types::{RawValue, Subr};
use crate::session::Session;
use crate::value::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Build the uniform entry point for a marshaled function
pub(crate) fn trampoline(session: Arc<Session>, label: String, function: MarshaledFunction) -> Subr {
    Box::new(move |host: &dyn Host, args: &[RawValue]| -> RawValue {
        let env = session.enter(host);
        guard(&env, &label, |env| {
            let args: Vec<Value<'_>> = args.iter().map(|raw| Value::new(*raw, env)).collect();
            function.invoke(env, &args).map(|value| value.raw())
        })
    })
}

/// Run native code for one entry, converting failures into a pending exit
///
/// Returns the produced value, or `nil` with an exit pending.
pub fn guard<'e, F>(env: &'e Env<'e>, label: &str, f: F) -> RawValue
where
    F: FnOnce(&'e Env<'e>) -> Result<RawValue>,
{
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(env))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(function = %label, panic = %message, "native code panicked");
            Err(Error::Unknown(message))
        }
    };

    match outcome {
        Ok(raw) => raw,
        Err(err) => {
            if !err.is_foreign() {
                warn!(function = %label, error = %err, "native call failed");
            }
            raise(env, err);
            env.host().intern("nil")
        }
    }
}

/// Make an error pending on the foreign side
///
/// The exit takes effect once native code returns to the runtime.
pub fn raise<'e>(env: &'e Env<'e>, err: Error) {
    match err {
        Error::ForeignSignal { symbol, data } => {
            env.host().non_local_exit_signal(symbol.raw(), data.raw());
        }
        Error::ForeignThrow { tag, value } => {
            env.host().non_local_exit_throw(tag.raw(), value.raw());
        }
        Error::Arity { expected, actual } => contract_violation(expected, actual),
        Error::WrongType {
            expected,
            actual,
            value,
        } => {
            let data = (|| -> Result<Value<'e>> {
                let offending = match value {
                    Some(global) => global.into_foreign(env)?,
                    None => env.nil()?,
                };
                let items = [env.string(&expected)?, env.string(&actual)?, offending];
                env.list(&items)
            })();
            signal_or_fallback(env, "wrong-type-argument", data);
        }
        other => {
            let message = other.to_string();
            let data = env.string(&message).and_then(|m| env.list(&[m]));
            signal_or_fallback(env, env.session().error_symbol(), data);
        }
    }
}

/// Signal `symbol` with `data`, or with nil data if building it failed
fn signal_or_fallback<'e>(env: &'e Env<'e>, symbol: &str, data: Result<Value<'e>>) {
    let host = env.host();
    let data = match data {
        Ok(data) => data.raw(),
        Err(err) => {
            warn!(symbol, error = %err, "could not build signal data");
            host.intern("nil")
        }
    };
    host.non_local_exit_signal(host.intern(symbol), data);
}

fn contract_violation(expected: usize, actual: usize) -> ! {
    error!(
        expected,
        actual, "registered arity violated by the runtime, aborting"
    );
    std::process::abort()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "native code panicked".to_string()
    }
}
