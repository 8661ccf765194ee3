//! Native values carried through the foreign runtime as user pointers
//!
//! `Opaque<T>` hands the runtime a shared reference to a native value. The
//! runtime owns one strong reference through a boxed cell and drops it with
//! the user pointer's finalizer when it frees the value. Native code reading
//! the pointer back gets another shared reference and never takes ownership.
//!
//! Every cell made here carries the same finalizer, [`finalize_cell`]. A user
//! pointer with any other finalizer belongs to someone else and is rejected
//! without being read.

use crate::api::conversion::{expect_type, mismatch, FromForeign, IntoForeign};
use crate::env::Env;
use crate::error::Result;
use crate::ffi::types::Finalizer;
use crate::value::Value;
use std::any::{type_name, Any};
use std::fmt;
use std::ops::Deref;
use std::os::raw::c_void;
use std::sync::Arc;

struct Cell {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

unsafe extern "C" fn finalize_cell(ptr: *mut c_void) {
    if !ptr.is_null() {
        // SAFETY: this finalizer is only attached to pointers produced by
        // `Box::into_raw` on a `Cell` in `into_foreign`, and the runtime runs
        // each finalizer once.
        drop(unsafe { Box::from_raw(ptr.cast::<Cell>()) });
    }
}

fn is_cell_finalizer(finalizer: Finalizer) -> bool {
    finalizer as usize == finalize_cell as usize
}

/// Shared native value stored in the foreign runtime
pub struct Opaque<T>(Arc<T>);

impl<T> Opaque<T> {
    pub fn new(value: T) -> Self {
        Opaque(Arc::new(value))
    }

    pub fn from_arc(value: Arc<T>) -> Self {
        Opaque(value)
    }

    pub fn into_arc(self) -> Arc<T> {
        self.0
    }

    /// Shared references currently alive, the runtime's included
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }
}

impl<T> Clone for Opaque<T> {
    fn clone(&self) -> Self {
        Opaque(Arc::clone(&self.0))
    }
}

impl<T> Deref for Opaque<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Opaque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.0).finish()
    }
}

impl<T: Send + Sync + 'static> IntoForeign for Opaque<T> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        let cell = Box::new(Cell {
            type_name: type_name::<T>(),
            value: self.0,
        });
        let ptr = Box::into_raw(cell).cast::<c_void>();
        let finalizer: Finalizer = finalize_cell;

        let raw = env.host().make_user_ptr(Some(finalizer), ptr);
        match env.wrap(raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                // The runtime did not take the pointer
                // SAFETY: `ptr` came from `Box::into_raw` above and was not handed out.
                unsafe { finalize_cell(ptr) };
                Err(err)
            }
        }
    }
}

impl<T: Send + Sync + 'static> FromForeign for Opaque<T> {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        expect_type(value, "user-ptr")?;
        let env = value.env();

        let finalizer = env.check(env.host().get_user_finalizer(value.raw()))?;
        if !finalizer.is_some_and(is_cell_finalizer) {
            return Err(mismatch(value, type_name::<T>(), "foreign user-ptr"));
        }

        let ptr = env.check(env.host().get_user_ptr(value.raw()))?;
        if ptr.is_null() {
            return Err(mismatch(value, type_name::<T>(), "null user-ptr"));
        }

        // SAFETY: the finalizer identifies a `Cell` made by `into_foreign`,
        // and the runtime keeps it alive while `value` is reachable.
        let cell = unsafe { &*ptr.cast::<Cell>() };
        match Arc::clone(&cell.value).downcast::<T>() {
            Ok(shared) => Ok(Opaque(shared)),
            Err(_) => Err(mismatch(value, type_name::<T>(), cell.type_name)),
        }
    }
}

impl<T> From<Opaque<T>> for Arc<T> {
    fn from(opaque: Opaque<T>) -> Self {
        opaque.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ffi::host::Host;
    use crate::loopback::Loopback;
    use crate::session::{Session, SessionConfig};

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[derive(Debug)]
    struct Other;

    #[test]
    fn test_round_trip_shares_value() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let original = Opaque::new(Counter(3));
        let value = original.clone().into_foreign(&env).unwrap();
        assert_eq!(value.type_name().unwrap(), "user-ptr");

        let back = Opaque::<Counter>::from_foreign(value).unwrap();
        assert_eq!(*back, Counter(3));
        // original + runtime cell + back
        assert_eq!(Opaque::strong_count(&original), 3);
    }

    #[test]
    fn test_wrong_native_type_is_rejected() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let value = Opaque::new(Counter(1)).into_foreign(&env).unwrap();
        let err = Opaque::<Other>::from_foreign(value).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongType { ref expected, ref actual, .. }
                if expected.ends_with("Other") && actual.ends_with("Counter")
        ));
    }

    #[test]
    fn test_finalizer_releases_runtime_reference() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let original = Opaque::new(Counter(0));
        let value = original.clone().into_foreign(&env).unwrap();
        assert_eq!(Opaque::strong_count(&original), 2);

        host.free_object(value.raw());
        assert_eq!(Opaque::strong_count(&original), 1);
        // A second free is a no-op
        host.free_object(value.raw());
        assert_eq!(Opaque::strong_count(&original), 1);
    }

    unsafe extern "C" fn free_byte(ptr: *mut c_void) {
        drop(unsafe { Box::from_raw(ptr.cast::<u8>()) });
    }

    #[test]
    fn test_other_modules_user_ptr_is_rejected() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let bare = host.make_user_ptr(None, Box::into_raw(Box::new(7_u8)).cast());
        let err = Opaque::<String>::from_foreign(Value::new(bare, &env)).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongType { ref actual, .. } if actual == "foreign user-ptr"
        ));

        let owned = host.make_user_ptr(Some(free_byte as Finalizer), Box::into_raw(Box::new(7_u8)).cast());
        let err = Opaque::<String>::from_foreign(Value::new(owned, &env)).unwrap_err();
        assert!(matches!(err, Error::WrongType { .. }));
        host.free_object(owned);
    }

    #[test]
    fn test_integer_is_not_opaque() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let value = env.int(1).unwrap();
        assert!(matches!(
            Opaque::<Counter>::from_foreign(value),
            Err(Error::WrongType { ref actual, .. }) if actual == "integer"
        ));
    }
}
