//! Native functions example
//!
//! Registers typed Rust functions and calls them the way foreign code would.
//!
//! Run with: cargo run --example 01_native_functions -p tether-runtime

use tether_runtime::loopback::Loopback;
use tether_runtime::{Env, Error, FunctionBuilder, Result, Session, SessionConfig};

fn main() -> Result<()> {
    tether_runtime::logging::init_with_config(tether_runtime::logging::LogConfig::debug());

    let host = Loopback::new();
    let session = Session::start(&host, SessionConfig::default())?;
    let env = session.enter(&host);

    FunctionBuilder::new("add")
        .doc("Add two integers.")
        .build(&env, |x: i64, y: i64| -> Result<i64> { Ok(x + y) })?;

    FunctionBuilder::new("throwsAlways")
        .build(&env, |x: i64| -> Result<i64> {
            Err(Error::custom(format!("Got {}!", x)))
        })?;

    FunctionBuilder::new("greet")
        .build_with_env(&env, |env: &Env<'_>, name: String| -> Result<String> {
            env.call_as("concat", ("Hello, ", name))
        })?;

    match host.call("add", &[host.make_int(2), host.make_int(3)]) {
        Ok(sum) => println!("add(2, 3) = {:?}", host.integer(sum)),
        Err(exit) => println!("add failed: {:?}", host.exit_message(&exit)),
    }
    // Output: add(2, 3) = Some(5)

    match host.call("throwsAlways", &[host.make_int(42)]) {
        Ok(_) => println!("throwsAlways returned"),
        Err(exit) => println!(
            "throwsAlways signaled {:?}: {:?}",
            host.symbol_name(exit.symbol),
            host.exit_message(&exit)
        ),
    }
    // Output: throwsAlways signaled Some("tether-error"): Some("Got 42!")

    match host.call("greet", &[host.make_str("world")]) {
        Ok(greeting) => println!("{}", host.string(greeting).unwrap_or_default()),
        Err(exit) => println!("greet failed: {:?}", host.exit_message(&exit)),
    }
    // Output: Hello, world

    Ok(())
}
