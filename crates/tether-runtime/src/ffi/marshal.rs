//! Call marshaling - typed closures behind a uniform entry point
//!
//! A native closure such as `|x: i64, y: i64| -> Result<i64>` is erased into a
//! [`MarshaledFunction`]: a fixed arity plus one routine that takes foreign
//! argument values, converts each with its [`FromForeign`] witness in order,
//! calls the closure and converts the result back with [`IntoForeign`].
//!
//! The arity is derived from the closure's signature. Invoking with any other
//! argument count fails with [`Error::Arity`] before anything is converted.
//!
//! # Example
//!
//! ```
//! # use tether_runtime::ffi::marshal::MarshaledFunction;
//! # use tether_runtime::Result;
//! let add = MarshaledFunction::new(|x: i64, y: i64| -> Result<i64> { Ok(x + y) });
//! assert_eq!(add.arity(), 2);
//! ```

use crate::api::conversion::{FromForeign, IntoForeign};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;

/// Type-erased form every registered function is stored as
type ErasedFn = Box<dyn for<'e> Fn(&'e Env<'e>, &[Value<'e>]) -> Result<Value<'e>>>;

/// A native function with its arity, ready to be registered
pub struct MarshaledFunction {
    arity: usize,
    erased: ErasedFn,
}

impl MarshaledFunction {
    /// Marshal a closure whose parameters all have conversion witnesses
    pub fn new<Args, F: Marshal<Args>>(f: F) -> Self {
        f.into_marshaled()
    }

    /// Marshal a closure that also receives the current [`Env`]
    pub fn with_env<Args, F: MarshalWithEnv<Args>>(f: F) -> Self {
        f.into_marshaled_with_env()
    }

    /// Wrap a routine working on raw foreign values
    pub fn raw<F>(arity: usize, f: F) -> Self
    where
        F: for<'e> Fn(&'e Env<'e>, &[Value<'e>]) -> Result<Value<'e>> + 'static,
    {
        Self {
            arity,
            erased: Box::new(f),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Run the function with foreign arguments
    ///
    /// # Errors
    ///
    /// - [`Error::Arity`] when `args.len()` differs from the arity
    /// - the first argument conversion error, in argument order
    /// - whatever the closure or the result conversion returns
    pub fn invoke<'e>(&self, env: &'e Env<'e>, args: &[Value<'e>]) -> Result<Value<'e>> {
        if args.len() != self.arity {
            return Err(Error::Arity {
                expected: self.arity,
                actual: args.len(),
            });
        }
        (self.erased)(env, args)
    }
}

impl fmt::Debug for MarshaledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshaledFunction")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Argument tuples that can be read from foreign values
pub trait FromArgs: Sized {
    const ARITY: usize;

    fn from_args(args: &[Value<'_>]) -> Result<Self>;
}

macro_rules! impl_from_args {
    ($arity:expr; $($A:ident $idx:tt),*) => {
        impl<$($A: FromForeign,)*> FromArgs for ($($A,)*) {
            const ARITY: usize = $arity;

            fn from_args(args: &[Value<'_>]) -> Result<Self> {
                if args.len() != Self::ARITY {
                    return Err(Error::Arity {
                        expected: Self::ARITY,
                        actual: args.len(),
                    });
                }
                Ok(($($A::from_foreign(args[$idx])?,)*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A 0);
impl_from_args!(2; A 0, B 1);
impl_from_args!(3; A 0, B 1, C 2);
impl_from_args!(4; A 0, B 1, C 2, D 3);
impl_from_args!(5; A 0, B 1, C 2, D 3, E 4);
impl_from_args!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_from_args!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_from_args!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// The single conversion routine shared by every closure shape
fn typed<Args, R, F>(f: F) -> MarshaledFunction
where
    Args: FromArgs + 'static,
    R: IntoForeign + 'static,
    F: for<'a> Fn(&'a Env<'a>, Args) -> Result<R> + 'static,
{
    MarshaledFunction::raw(Args::ARITY, move |env, args| {
        let args = Args::from_args(args)?;
        f(env, args)?.into_foreign(env)
    })
}

/// Closures `Fn(A, B, ..) -> Result<R>` with up to eight parameters
pub trait Marshal<Args> {
    fn into_marshaled(self) -> MarshaledFunction;
}

/// Closures `Fn(&Env, A, B, ..) -> Result<R>` with up to eight parameters
pub trait MarshalWithEnv<Args> {
    fn into_marshaled_with_env(self) -> MarshaledFunction;
}

macro_rules! impl_marshal {
    ($($A:ident $a:ident),*) => {
        impl<Func, R, $($A,)*> Marshal<($($A,)*)> for Func
        where
            Func: Fn($($A),*) -> Result<R> + 'static,
            R: IntoForeign + 'static,
            $($A: FromForeign + 'static,)*
        {
            fn into_marshaled(self) -> MarshaledFunction {
                typed(move |_env, ($($a,)*): ($($A,)*)| self($($a),*))
            }
        }

        impl<Func, R, $($A,)*> MarshalWithEnv<($($A,)*)> for Func
        where
            Func: Fn(&Env<'_>, $($A),*) -> Result<R> + 'static,
            R: IntoForeign + 'static,
            $($A: FromForeign + 'static,)*
        {
            fn into_marshaled_with_env(self) -> MarshaledFunction {
                typed(move |env, ($($a,)*): ($($A,)*)| self(env, $($a),*))
            }
        }
    };
}

impl_marshal!();
impl_marshal!(A a);
impl_marshal!(A a, B b);
impl_marshal!(A a, B b, C c);
impl_marshal!(A a, B b, C c, D d);
impl_marshal!(A a, B b, C c, D d, E e);
impl_marshal!(A a, B b, C c, D d, E e, F f);
impl_marshal!(A a, B b, C c, D d, E e, F f, G g);
impl_marshal!(A a, B b, C c, D d, E e, F f, G g, H h);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::Loopback;
    use crate::session::{Session, SessionConfig};

    #[test]
    fn test_arity_comes_from_signature() {
        let zero = MarshaledFunction::new(|| -> Result<()> { Ok(()) });
        let three = MarshaledFunction::new(|_a: i64, _b: String, _c: bool| -> Result<()> { Ok(()) });
        let with_env = MarshaledFunction::with_env(|_env: &Env<'_>, _a: f64| -> Result<f64> { Ok(0.0) });
        assert_eq!(zero.arity(), 0);
        assert_eq!(three.arity(), 3);
        assert_eq!(with_env.arity(), 1);
    }

    #[test]
    fn test_invoke_converts_and_returns() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let add = MarshaledFunction::new(|x: i64, y: i64| -> Result<i64> { Ok(x + y) });
        let args = [env.int(2).unwrap(), env.int(3).unwrap()];
        let result = add.invoke(&env, &args).unwrap();
        assert_eq!(host.integer(result.raw()), Some(5));
    }

    #[test]
    fn test_invoke_wrong_count_is_arity_error() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let unary = MarshaledFunction::new(|x: i64| -> Result<i64> { Ok(x) });
        let args = [env.int(1).unwrap(), env.int(2).unwrap(), env.int(3).unwrap()];
        match unary.invoke(&env, &args) {
            Err(Error::Arity { expected, actual }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected Arity error, got {:?}", other),
        }
    }

    #[test]
    fn test_first_failing_argument_wins() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let f = MarshaledFunction::new(|_a: i64, _b: String| -> Result<()> { Ok(()) });
        // Both arguments are wrong; the first one is reported
        let args = [env.string("x").unwrap(), env.int(1).unwrap()];
        match f.invoke(&env, &args) {
            Err(Error::WrongType { expected, .. }) => assert_eq!(expected, "integer"),
            other => panic!("Expected WrongType, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_return_is_nil() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let f = MarshaledFunction::new(|| -> Result<()> { Ok(()) });
        assert!(f.invoke(&env, &[]).unwrap().is_nil());
    }
}
