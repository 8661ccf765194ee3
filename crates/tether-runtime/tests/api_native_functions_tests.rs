//! Native function registration and calling tests
//!
//! Registers Rust closures and calls them the way foreign code would, through
//! the loopback runtime's `funcall`. Covers arity handling, result conversion
//! and how every kind of failure surfaces on the foreign side.

mod common;

use common::{assert_signal, Harness};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_runtime::api::{Datum, FunctionBuilder, Opaque};
use std::os::raw::c_void;
use tether_runtime::ffi::{ExitKind, Finalizer};
use tether_runtime::{Env, Error, Host, RawValue, Result, SessionConfig, Symbol};

// ============================================================================
// Helpers
// ============================================================================

fn register_sum(env: &Env<'_>, name: &str, arity: usize) -> Result<()> {
    let builder = FunctionBuilder::new(name);
    let registered = match arity {
        0 => builder.build(env, || -> Result<i64> { Ok(0) }),
        1 => builder.build(env, |a: i64| -> Result<i64> { Ok(a) }),
        2 => builder.build(env, |a: i64, b: i64| -> Result<i64> { Ok(a + b) }),
        3 => builder.build(env, |a: i64, b: i64, c: i64| -> Result<i64> { Ok(a + b + c) }),
        4 => builder.build(env, |a: i64, b: i64, c: i64, d: i64| -> Result<i64> {
            Ok(a + b + c + d)
        }),
        5 => builder.build(env, |a: i64, b: i64, c: i64, d: i64, e: i64| -> Result<i64> {
            Ok(a + b + c + d + e)
        }),
        _ => unreachable!("arity {} not covered", arity),
    };
    registered.map(|_| ())
}

fn register_sum_with_env(env: &Env<'_>, name: &str, arity: usize) -> Result<()> {
    let builder = FunctionBuilder::new(name);
    let registered = match arity {
        0 => builder.build_with_env(env, |env: &Env<'_>| -> Result<i64> { env.call_as("+", ()) }),
        1 => builder.build_with_env(env, |env: &Env<'_>, a: i64| -> Result<i64> {
            env.call_as("+", (a,))
        }),
        2 => builder.build_with_env(env, |env: &Env<'_>, a: i64, b: i64| -> Result<i64> {
            env.call_as("+", (a, b))
        }),
        3 => builder.build_with_env(env, |env: &Env<'_>, a: i64, b: i64, c: i64| -> Result<i64> {
            env.call_as("+", (a, b, c))
        }),
        4 => builder.build_with_env(
            env,
            |env: &Env<'_>, a: i64, b: i64, c: i64, d: i64| -> Result<i64> {
                env.call_as("+", (a, b, c, d))
            },
        ),
        5 => builder.build_with_env(
            env,
            |env: &Env<'_>, a: i64, b: i64, c: i64, d: i64, e: i64| -> Result<i64> {
                env.call_as("+", (a, b, c, d, e))
            },
        ),
        _ => unreachable!("arity {} not covered", arity),
    };
    registered.map(|_| ())
}

fn args_for(harness: &Harness, arity: usize) -> Vec<RawValue> {
    (1..=arity as i64).map(|n| harness.int(n)).collect()
}

fn expected_sum(arity: usize) -> i64 {
    (1..=arity as i64).sum()
}

// ============================================================================
// Arity and signatures
// ============================================================================

#[rstest]
fn test_exact_arity_returns_converted_result(
    #[values(0, 1, 2, 3, 4, 5)] arity: usize,
    #[values(false, true)] with_env: bool,
) {
    let harness = Harness::new();
    let env = harness.env();
    if with_env {
        register_sum_with_env(&env, "sum", arity).unwrap();
    } else {
        register_sum(&env, "sum", arity).unwrap();
    }

    let result = harness.call_ok("sum", &args_for(&harness, arity));
    assert_eq!(harness.host.integer(result), Some(expected_sum(arity)));
}

#[rstest]
fn test_other_argument_counts_are_rejected(#[values(0, 1, 2, 3, 4, 5)] arity: usize) {
    let harness = Harness::new();
    let env = harness.env();
    register_sum(&env, "sum", arity).unwrap();

    let exit = harness.call_err("sum", &args_for(&harness, arity + 1));
    assert_eq!(harness.symbol_of(&exit), "wrong-number-of-arguments");

    if arity > 0 {
        let exit = harness.call_err("sum", &args_for(&harness, arity - 1));
        assert_eq!(harness.symbol_of(&exit), "wrong-number-of-arguments");
    }
}

#[rstest]
#[case::plain(false)]
#[case::with_env(true)]
fn test_unit_return_is_nil(#[case] with_env: bool) {
    let harness = Harness::new();
    let env = harness.env();
    let builder = FunctionBuilder::new("noop");
    if with_env {
        builder
            .build_with_env(&env, |_env: &Env<'_>, _x: i64| -> Result<()> { Ok(()) })
            .unwrap();
    } else {
        builder.build(&env, |_x: i64| -> Result<()> { Ok(()) }).unwrap();
    }

    let result = harness.call_ok("noop", &[harness.int(1)]);
    assert!(harness.host.symbol_name(result).as_deref() == Some("nil"));
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_add_end_to_end() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("add")
        .build(&env, |x: i64, y: i64| -> Result<i64> { Ok(x + y) })
        .unwrap();

    let result = harness.call_ok("add", &[harness.int(2), harness.int(3)]);
    assert_eq!(harness.host.integer(result), Some(5));
}

#[test]
fn test_throws_always_signals_message() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("throwsAlways")
        .build(&env, |x: i64| -> Result<i64> {
            Err(Error::custom(format!("Got {}!", x)))
        })
        .unwrap();

    let exit = harness.call_err("throwsAlways", &[harness.int(42)]);
    assert_eq!(exit.kind, ExitKind::Signal);
    assert_signal(&harness, &exit, "tether-error", "Got 42!");
}

#[test]
fn test_string_arguments_and_result() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("greet")
        .build(&env, |name: String, times: usize| -> Result<String> {
            Ok(format!("héllo {}", name).repeat(times))
        })
        .unwrap();

    let result = harness.call_ok("greet", &[harness.str("wörld"), harness.int(2)]);
    assert_eq!(
        harness.host.string(result).as_deref(),
        Some("héllo wörldhéllo wörld")
    );
}

// ============================================================================
// Error mapping
// ============================================================================

#[test]
fn test_wrong_argument_type_signals_wrong_type() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("add")
        .build(&env, |x: i64, y: i64| -> Result<i64> { Ok(x + y) })
        .unwrap();

    let exit = harness.call_err("add", &[harness.int(1), harness.str("two")]);
    assert_eq!(harness.symbol_of(&exit), "wrong-type-argument");

    let data = harness.host.list_items(exit.data);
    assert_eq!(data.len(), 3);
    assert_eq!(harness.host.string(data[0]).as_deref(), Some("integer"));
    assert_eq!(harness.host.string(data[1]).as_deref(), Some("string"));
    assert_eq!(harness.host.string(data[2]).as_deref(), Some("two"));
}

#[test]
fn test_wrong_type_from_closure() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("picky")
        .build(&env, || -> Result<i64> { Err(Error::wrong_type("vector", "cons")) })
        .unwrap();

    let exit = harness.call_err("picky", &[]);
    let data = harness.host.list_items(exit.data);
    assert_eq!(harness.symbol_of(&exit), "wrong-type-argument");
    assert_eq!(harness.host.string(data[0]).as_deref(), Some("vector"));
    assert_eq!(harness.host.string(data[1]).as_deref(), Some("cons"));
}

#[test]
fn test_panic_is_contained() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("explode")
        .build(&env, || -> Result<i64> { panic!("native bug") })
        .unwrap();

    let exit = harness.call_err("explode", &[]);
    assert_signal(&harness, &exit, "tether-error", "native bug");

    // The runtime keeps working afterwards
    let list = harness.call_ok("list", &[harness.int(1)]);
    assert_eq!(harness.host.list_items(list).len(), 1);
}

#[test]
fn test_foreign_signal_is_reraised_verbatim() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("quitter")
        .build_with_env(&env, |env: &Env<'_>| -> Result<()> {
            env.call(
                "signal",
                (Symbol::new("quit"), Datum::List(vec![Datum::from("stop here")])),
            )?;
            Ok(())
        })
        .unwrap();

    let exit = harness.call_err("quitter", &[]);
    assert_eq!(exit.kind, ExitKind::Signal);
    assert_signal(&harness, &exit, "quit", "stop here");
}

#[test]
fn test_foreign_throw_is_rethrown_verbatim() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("escaper")
        .build_with_env(&env, |env: &Env<'_>| -> Result<()> {
            env.call("throw", (Symbol::new("done"), 7_i64))?;
            Ok(())
        })
        .unwrap();

    let exit = harness.call_err("escaper", &[]);
    assert_eq!(exit.kind, ExitKind::Throw);
    assert_eq!(harness.host.symbol_name(exit.symbol).as_deref(), Some("done"));
    assert_eq!(harness.host.integer(exit.data), Some(7));
}

#[test]
fn test_native_code_can_recover_from_foreign_error() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("safe-car")
        .build_with_env(&env, |env: &Env<'_>, x: i64| -> Result<i64> {
            match env.call("car", (x,)) {
                Ok(head) => head.into_rust(),
                Err(err) if err.is_foreign() => Ok(-1),
                Err(err) => Err(err),
            }
        })
        .unwrap();

    let result = harness.call_ok("safe-car", &[harness.int(5)]);
    assert_eq!(harness.host.integer(result), Some(-1));
}

#[test]
fn test_configured_error_symbol() {
    let harness = Harness::with_config(SessionConfig {
        error_symbol: "demo-error".to_string(),
        error_message: "Demo module error".to_string(),
        ..SessionConfig::default()
    });
    assert_eq!(
        harness.host.error_message("demo-error").as_deref(),
        Some("Demo module error")
    );

    let env = harness.env();
    FunctionBuilder::new("boom")
        .build(&env, || -> Result<()> { Err(Error::custom("boom")) })
        .unwrap();

    let exit = harness.call_err("boom", &[]);
    assert_signal(&harness, &exit, "demo-error", "boom");
}

// ============================================================================
// Re-entrancy and opaque values
// ============================================================================

#[test]
fn test_native_calls_native_through_runtime() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("square")
        .build(&env, |x: i64| -> Result<i64> { Ok(x * x) })
        .unwrap();
    FunctionBuilder::new("sum-of-squares")
        .build_with_env(&env, |env: &Env<'_>, a: i64, b: i64| -> Result<i64> {
            let a2: i64 = env.call_as("square", (a,))?;
            let b2: i64 = env.call_as("square", (b,))?;
            Ok(a2 + b2)
        })
        .unwrap();

    let result = harness.call_ok("sum-of-squares", &[harness.int(3), harness.int(4)]);
    assert_eq!(harness.host.integer(result), Some(25));
}

#[test]
fn test_opaque_counter() {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("counter-new")
        .build(&env, || -> Result<Opaque<AtomicU64>> {
            Ok(Opaque::new(AtomicU64::new(0)))
        })
        .unwrap();
    FunctionBuilder::new("counter-bump")
        .build(&env, |counter: Opaque<AtomicU64>| -> Result<u64> {
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .unwrap();

    let counter = harness.call_ok("counter-new", &[]);
    harness.call_ok("counter-bump", &[counter]);
    let result = harness.call_ok("counter-bump", &[counter]);
    assert_eq!(harness.host.integer(result), Some(2));

    let exit = harness.call_err("counter-bump", &[harness.int(0)]);
    assert_eq!(harness.symbol_of(&exit), "wrong-type-argument");
}

unsafe extern "C" fn free_byte(ptr: *mut c_void) {
    drop(unsafe { Box::from_raw(ptr.cast::<u8>()) });
}

#[rstest]
#[case::no_finalizer(None)]
#[case::own_finalizer(Some(free_byte as Finalizer))]
fn test_user_ptr_from_another_module_is_wrong_type(#[case] finalizer: Option<Finalizer>) {
    let harness = Harness::new();
    let env = harness.env();
    FunctionBuilder::new("read-opaque")
        .build(&env, |text: Opaque<String>| -> Result<usize> { Ok(text.len()) })
        .unwrap();

    let byte = Box::into_raw(Box::new(0_u8)).cast::<c_void>();
    let foreign = harness.host.make_user_ptr(finalizer, byte);

    let exit = harness.call_err("read-opaque", &[foreign]);
    assert_eq!(harness.symbol_of(&exit), "wrong-type-argument");
    let data = harness.host.list_items(exit.data);
    assert_eq!(harness.host.string(data[1]).as_deref(), Some("foreign user-ptr"));

    match finalizer {
        Some(_) => harness.host.free_object(foreign),
        // SAFETY: nothing else owns the byte once the runtime has no finalizer
        None => drop(unsafe { Box::from_raw(byte.cast::<u8>()) }),
    }
}
