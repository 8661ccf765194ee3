//! Thread-safe snapshots of foreign data
//!
//! Foreign values can only be touched on the runtime's thread. A `Datum` is
//! plain native data that can be built anywhere, moved across threads, and
//! turned into a foreign value once a callback runs on the runtime's thread.

use crate::api::conversion::{walk_list, FromForeign, IntoForeign, ListEnd};
use crate::env::Env;
use crate::error::Result;
use crate::value::{GlobalValue, Value};
use std::sync::Arc;

/// Native data with a foreign representation
#[derive(Debug, Clone)]
pub enum Datum {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    /// A proper list
    List(Vec<Datum>),
    /// A retained foreign value passed through unchanged
    Global(Arc<GlobalValue>),
}

impl Datum {
    pub fn symbol(name: impl Into<String>) -> Self {
        Datum::Symbol(name.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Datum::Nil)
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Nil, Datum::Nil) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::Float(a), Datum::Float(b)) => a == b,
            (Datum::Str(a), Datum::Str(b)) => a == b,
            (Datum::Symbol(a), Datum::Symbol(b)) => a == b,
            (Datum::List(a), Datum::List(b)) => a == b,
            (Datum::Global(a), Datum::Global(b)) => a.raw() == b.raw(),
            _ => false,
        }
    }
}

impl IntoForeign for Datum {
    fn into_foreign<'e>(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        match self {
            Datum::Nil => env.nil(),
            Datum::Bool(b) => b.into_foreign(env),
            Datum::Int(i) => env.int(i),
            Datum::Float(f) => env.float(f),
            Datum::Str(s) => env.string(&s),
            Datum::Symbol(name) => env.intern(&name),
            Datum::List(items) => {
                let items = items
                    .into_iter()
                    .map(|item| item.into_foreign(env))
                    .collect::<Result<Vec<_>>>()?;
                env.list(&items)
            }
            Datum::Global(global) => Ok(env.hold(global)),
        }
    }
}

/// `t` reads back as `Bool(true)` and `nil` as `Nil`; proper lists become
/// `List`; values without a plain-data form are retained as `Global`.
impl FromForeign for Datum {
    fn from_foreign(value: Value<'_>) -> Result<Self> {
        if value.is_nil() {
            return Ok(Datum::Nil);
        }

        let env = value.env();
        match value.type_name()?.as_str() {
            "integer" => i64::from_foreign(value).map(Datum::Int),
            "float" => f64::from_foreign(value).map(Datum::Float),
            "string" => String::from_foreign(value).map(Datum::Str),
            "symbol" => {
                let name = env.symbol_name(value)?;
                Ok(if name == "t" {
                    Datum::Bool(true)
                } else {
                    Datum::Symbol(name)
                })
            }
            "cons" => {
                let mut items = Vec::new();
                let end = walk_list(value, |item| {
                    items.push(Datum::from_foreign(item)?);
                    Ok(())
                })?;
                match end {
                    ListEnd::Proper => Ok(Datum::List(items)),
                    // No plain-data form: keep the whole value as-is
                    ListEnd::Dotted | ListEnd::Circular => {
                        value.make_global().map(|g| Datum::Global(Arc::new(g)))
                    }
                }
            }
            _ => value.make_global().map(|g| Datum::Global(Arc::new(g))),
        }
    }
}

impl From<()> for Datum {
    fn from(_: ()) -> Self {
        Datum::Nil
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Int(i)
    }
}

impl From<i32> for Datum {
    fn from(i: i32) -> Self {
        Datum::Int(i64::from(i))
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Self {
        Datum::Float(f)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Str(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Str(s)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(items: Vec<T>) -> Self {
        Datum::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map_or(Datum::Nil, Into::into)
    }
}

impl From<GlobalValue> for Datum {
    fn from(global: GlobalValue) -> Self {
        Datum::Global(Arc::new(global))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::Loopback;
    use crate::session::{Session, SessionConfig};

    #[test]
    fn test_nested_list_round_trip() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let datum = Datum::List(vec![
            Datum::Int(1),
            Datum::symbol("ok"),
            Datum::List(vec![Datum::Str("deep".to_string()), Datum::Float(0.5)]),
            Datum::Bool(true),
        ]);
        let value = datum.clone().into_foreign(&env).unwrap();
        assert_eq!(Datum::from_foreign(value).unwrap(), datum);
    }

    #[test]
    fn test_empty_list_reads_back_as_nil() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let value = Datum::List(Vec::new()).into_foreign(&env).unwrap();
        assert!(value.is_nil());
        assert_eq!(Datum::from_foreign(value).unwrap(), Datum::Nil);
    }

    #[test]
    fn test_vector_is_kept_as_global() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let value = vec![1_i64, 2].into_foreign(&env).unwrap();
        let datum = Datum::from_foreign(value).unwrap();
        match datum {
            Datum::Global(global) => assert!(global.bind(&env).is_eq(value)),
            other => panic!("Expected Global, got {:?}", other),
        }
    }

    #[test]
    fn test_conversions_from_native() {
        assert_eq!(Datum::from(3_i32), Datum::Int(3));
        assert_eq!(Datum::from(None::<i64>), Datum::Nil);
        assert_eq!(
            Datum::from(vec!["a", "b"]),
            Datum::List(vec![Datum::Str("a".into()), Datum::Str("b".into())])
        );
    }

    #[test]
    fn test_datum_is_send() {
        fn assert_send<T: Send + Sync>() {}
        assert_send::<Datum>();
    }
}
