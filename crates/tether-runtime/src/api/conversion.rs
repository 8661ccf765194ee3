//! Type conversion between Rust and foreign values
//!
//! Provides the two witness traits used by the call marshaler:
//! - `IntoForeign` - Convert a native value into a foreign `Value`
//! - `FromForeign` - Convert a foreign `Value` into a native value
//!
//! Inbound conversions check the runtime type first and fail with
//! [`Error::WrongType`] carrying the offending value. Container conversions
//! convert every element before building anything, so the first failing
//! element aborts the whole conversion.
//!
//! # Examples
//!
//! ```
//! use tether_runtime::api::{FromForeign, IntoForeign};
//! use tether_runtime::loopback::Loopback;
//! use tether_runtime::{Session, SessionConfig};
//!
//! let host = Loopback::new();
//! let session = Session::new(SessionConfig::default());
//! let env = session.enter(&host);
//!
//! let value = vec![1_i64, 2, 3].into_foreign(&env).unwrap();
//! let back: Vec<i64> = FromForeign::from_foreign(value).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

use crate::env::Env;
use crate::error::{Error, Result};
use crate::value::{GlobalValue, Value};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

/// Trait for converting foreign values to Rust types
pub trait FromForeign: Sized {
    /// Convert from a foreign `Value`
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongType`] if the value has the wrong runtime type, or
    /// the error the runtime raised while inspecting it.
    fn from_foreign(value: Value<'_>) -> Result<Self>;
}

/// Trait for converting Rust types to foreign values
pub trait IntoForeign {
    /// Convert into a foreign `Value` owned by `env`
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>>;
}

/// Build a wrong-type error that keeps the offending value when possible
pub(crate) fn mismatch(value: Value<'_>, expected: &str, actual: impl Into<String>) -> Error {
    Error::WrongType {
        expected: expected.to_string(),
        actual: actual.into(),
        value: value.make_global().ok(),
    }
}

/// Fail unless the runtime reports `expected` as the value's type
pub(crate) fn expect_type(value: Value<'_>, expected: &str) -> Result<()> {
    let actual = value.type_name()?;
    if actual == expected {
        Ok(())
    } else {
        Err(mismatch(value, expected, actual))
    }
}

// Implementations for i64 (integer)

impl FromForeign for i64 {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        expect_type(value, "integer")?;
        let env = value.env();
        env.check(env.host().extract_integer(value.raw()))
    }
}

impl IntoForeign for i64 {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.int(self)
    }
}

// Other integer widths go through i64 with a range check

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl FromForeign for $ty {
            fn from_foreign(value: Value<'_>) -> Result<Self> {
                let wide = i64::from_foreign(value)?;
                <$ty>::try_from(wide)
                    .map_err(|_| mismatch(value, stringify!($ty), format!("integer {}", wide)))
            }
        }

        impl IntoForeign for $ty {
            fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
                let wide = i64::try_from(self).map_err(|_| {
                    Error::Custom(format!("{} does not fit a foreign integer", self))
                })?;
                env.int(wide)
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, isize, u8, u16, u32, u64, usize);

// Implementations for f64 (float)

impl FromForeign for f64 {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        expect_type(value, "float")?;
        let env = value.env();
        env.check(env.host().extract_float(value.raw()))
    }
}

impl IntoForeign for f64 {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.float(self)
    }
}

impl FromForeign for f32 {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        f64::from_foreign(value).map(|f| f as f32)
    }
}

impl IntoForeign for f32 {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.float(f64::from(self))
    }
}

// Implementations for bool (nil is false, everything else is true)

impl FromForeign for bool {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        Ok(value.is_not_nil())
    }
}

impl IntoForeign for bool {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        if self {
            env.t()
        } else {
            env.nil()
        }
    }
}

// Implementations for String

impl FromForeign for String {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        expect_type(value, "string")?;
        value.env().copy_string(value)
    }
}

impl IntoForeign for String {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.string(&self)
    }
}

impl IntoForeign for &str {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.string(self)
    }
}

impl IntoForeign for &String {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.string(self)
    }
}

// Implementations for () (nil)

impl FromForeign for () {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        if value.is_nil() {
            Ok(())
        } else {
            let actual = value.type_name()?;
            Err(mismatch(value, "nil", actual))
        }
    }
}

impl IntoForeign for () {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.nil()
    }
}

// Implementations for Option<T> (nil is None)

impl<T: FromForeign> FromForeign for Option<T> {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_foreign(value).map(Some)
        }
    }
}

impl<T: IntoForeign> IntoForeign for Option<T> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        match self {
            None => env.nil(),
            Some(v) => v.into_foreign(env),
        }
    }
}

// Implementations for Vec<T> (vector)

impl<T: FromForeign> FromForeign for Vec<T> {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        expect_type(value, "vector")?;
        let env = value.env();
        let len: usize = env.call_as("length", [value])?;
        let mut result = Vec::with_capacity(len);
        for index in 0..len {
            let item = env.call("aref", (value, index))?;
            result.push(T::from_foreign(item)?);
        }
        Ok(result)
    }
}

impl<T: IntoForeign> IntoForeign for Vec<T> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        let items = self
            .into_iter()
            .map(|item| item.into_foreign(env))
            .collect::<Result<Vec<_>>>()?;
        env.call("vector", items.as_slice())
    }
}

// Implementations for (A, B) (cons cell)

impl<A: FromForeign, B: FromForeign> FromForeign for (A, B) {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        expect_type(value, "cons")?;
        let env = value.env();
        let first = A::from_foreign(env.call("car", [value])?)?;
        let second = B::from_foreign(env.call("cdr", [value])?)?;
        Ok((first, second))
    }
}

impl<A: IntoForeign, B: IntoForeign> IntoForeign for (A, B) {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.call("cons", self)
    }
}

// Maps travel as association lists: ((key . value) ...)

/// How a walked list ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListEnd {
    Proper,
    /// The last cdr is neither nil nor a cons
    Dotted,
    /// The cdr chain loops back on itself
    Circular,
}

/// Visit the elements of a list in order
///
/// A second cursor trails at half speed, so a cycle is detected within two
/// laps instead of looping forever.
pub(crate) fn walk_list<'e>(
    list: Value<'e>,
    mut visit: impl FnMut(Value<'e>) -> Result<()>,
) -> Result<ListEnd> {
    let env = list.env();
    let mut cursor = list;
    let mut trailing = list;
    let mut steps: usize = 0;
    while cursor.is_not_nil() {
        if cursor.type_name()? != "cons" {
            return Ok(ListEnd::Dotted);
        }
        visit(env.call("car", [cursor])?)?;
        cursor = env.call("cdr", [cursor])?;

        steps += 1;
        if steps % 2 == 0 {
            trailing = env.call("cdr", [trailing])?;
        }
        if cursor.is_not_nil() && cursor.is_eq(trailing) {
            return Ok(ListEnd::Circular);
        }
    }
    Ok(ListEnd::Proper)
}

fn alist_entries<K, V>(value: Value<'_>) -> Result<Vec<(K, V)>>
where
    K: FromForeign,
    V: FromForeign,
{
    let mut entries = Vec::new();
    match walk_list(value, |entry| {
        entries.push(<(K, V)>::from_foreign(entry)?);
        Ok(())
    })? {
        ListEnd::Proper => Ok(entries),
        ListEnd::Dotted => Err(mismatch(value, "alist", "dotted list")),
        ListEnd::Circular => Err(mismatch(value, "alist", "circular list")),
    }
}

fn build_alist<'e, K, V>(env: &'e Env<'e>, entries: impl Iterator<Item = (K, V)>) -> Result<Value<'e>>
where
    K: IntoForeign,
    V: IntoForeign,
{
    let cells = entries
        .map(|entry| entry.into_foreign(env))
        .collect::<Result<Vec<_>>>()?;
    env.list(&cells)
}

impl<K, V> FromForeign for HashMap<K, V>
where
    K: FromForeign + Eq + Hash,
    V: FromForeign,
{
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        let mut map = HashMap::new();
        // Earlier entries shadow later ones
        for (key, item) in alist_entries(value)? {
            map.entry(key).or_insert(item);
        }
        Ok(map)
    }
}

impl<K: IntoForeign, V: IntoForeign> IntoForeign for HashMap<K, V> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        build_alist(env, self.into_iter())
    }
}

impl<K, V> FromForeign for BTreeMap<K, V>
where
    K: FromForeign + Ord,
    V: FromForeign,
{
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (key, item) in alist_entries(value)? {
            map.entry(key).or_insert(item);
        }
        Ok(map)
    }
}

impl<K: IntoForeign, V: IntoForeign> IntoForeign for BTreeMap<K, V> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        build_alist(env, self.into_iter())
    }
}

// Foreign values pass through unchanged

impl IntoForeign for Value<'_> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(Value::new(self.raw(), env))
    }
}

impl FromForeign for GlobalValue {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        value.make_global()
    }
}

impl IntoForeign for GlobalValue {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(env.hold(Arc::new(self)))
    }
}

impl IntoForeign for &GlobalValue {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.hold_copy(self)
    }
}

impl FromForeign for Arc<GlobalValue> {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        value.make_global().map(Arc::new)
    }
}

impl IntoForeign for Arc<GlobalValue> {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(env.hold(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::Loopback;
    use crate::session::{Session, SessionConfig};

    fn fixture() -> (Loopback, Arc<Session>) {
        (Loopback::new(), Session::new(SessionConfig::default()))
    }

    // integer conversion tests

    #[test]
    fn test_i64_round_trip() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = 42_i64.into_foreign(&env).unwrap();
        assert_eq!(host.integer(value.raw()), Some(42));
        assert_eq!(i64::from_foreign(value).unwrap(), 42);
    }

    #[test]
    fn test_i64_from_string_is_wrong_type() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = "hello".into_foreign(&env).unwrap();
        match i64::from_foreign(value).unwrap_err() {
            Error::WrongType {
                expected,
                actual,
                value,
            } => {
                assert_eq!(expected, "integer");
                assert_eq!(actual, "string");
                assert!(value.is_some());
            }
            other => panic!("Expected WrongType, got {:?}", other),
        }
    }

    #[test]
    fn test_narrow_integer_out_of_range() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = 300_i64.into_foreign(&env).unwrap();
        assert!(matches!(
            u8::from_foreign(value),
            Err(Error::WrongType { ref expected, .. }) if expected == "u8"
        ));
        assert_eq!(u16::from_foreign(value).unwrap(), 300);
    }

    #[test]
    fn test_u64_too_large_for_foreign_integer() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        assert!(matches!(u64::MAX.into_foreign(&env), Err(Error::Custom(_))));
    }

    // float conversion tests

    #[test]
    fn test_f64_from_integer_is_wrong_type() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = 1_i64.into_foreign(&env).unwrap();
        assert!(matches!(f64::from_foreign(value), Err(Error::WrongType { .. })));
    }

    // bool conversion tests

    #[test]
    fn test_bool_uses_nil_and_t() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let yes = true.into_foreign(&env).unwrap();
        let no = false.into_foreign(&env).unwrap();
        assert_eq!(host.symbol_name(yes.raw()).as_deref(), Some("t"));
        assert!(no.is_nil());
        // Any non-nil value is true
        let zero = 0_i64.into_foreign(&env).unwrap();
        assert!(bool::from_foreign(zero).unwrap());
    }

    // unit and option tests

    #[test]
    fn test_unit_requires_nil() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let nil = ().into_foreign(&env).unwrap();
        assert!(<()>::from_foreign(nil).is_ok());
        let one = 1_i64.into_foreign(&env).unwrap();
        assert!(<()>::from_foreign(one).is_err());
    }

    #[test]
    fn test_option_maps_nil_to_none() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let none = None::<i64>.into_foreign(&env).unwrap();
        assert!(none.is_nil());
        assert_eq!(Option::<i64>::from_foreign(none).unwrap(), None);
        let some = Some(7_i64).into_foreign(&env).unwrap();
        assert_eq!(Option::<i64>::from_foreign(some).unwrap(), Some(7));
    }

    // container tests

    #[test]
    fn test_vec_becomes_vector() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = vec!["a".to_string(), "b".to_string()]
            .into_foreign(&env)
            .unwrap();
        assert_eq!(value.type_name().unwrap(), "vector");
        let back: Vec<String> = FromForeign::from_foreign(value).unwrap();
        assert_eq!(back, vec!["a", "b"]);
    }

    #[test]
    fn test_vec_element_failure_aborts() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = env
            .call("vector", (1_i64, "two", 3_i64))
            .unwrap();
        let err = Vec::<i64>::from_foreign(value).unwrap_err();
        assert!(matches!(err, Error::WrongType { ref actual, .. } if actual == "string"));
    }

    #[test]
    fn test_pair_is_cons() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = (1_i64, "x").into_foreign(&env).unwrap();
        assert_eq!(value.type_name().unwrap(), "cons");
        let (a, b): (i64, String) = FromForeign::from_foreign(value).unwrap();
        assert_eq!((a, b.as_str()), (1, "x"));
    }

    #[test]
    fn test_map_becomes_alist() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1_i64);
        map.insert("b".to_string(), 2_i64);
        let value = map.clone().into_foreign(&env).unwrap();
        assert_eq!(host.list_items(value.raw()).len(), 2);
        let back: BTreeMap<String, i64> = FromForeign::from_foreign(value).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_empty_alist_is_nil() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let nil = env.nil().unwrap();
        let map: HashMap<String, i64> = FromForeign::from_foreign(nil).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_global_value_round_trip() {
        let (host, session) = fixture();
        let env = session.enter(&host);
        let value = 5_i64.into_foreign(&env).unwrap();
        let global = GlobalValue::from_foreign(value).unwrap();
        let bound = global.into_foreign(&env).unwrap();
        assert!(bound.is_eq(value));
    }
}
