//! Shared test utilities
//!
//! Every integration test runs against the in-process loopback runtime.

#![allow(dead_code)]

use std::sync::Arc;
use tether_runtime::loopback::{Exit, Loopback};
use tether_runtime::{Env, RawValue, Session, SessionConfig};

// Re-export testing utilities
pub use pretty_assertions::assert_eq;

/// A loopback runtime with a started session
pub struct Harness {
    pub host: Loopback,
    pub session: Arc<Session>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let host = Loopback::new();
        let session = Session::start(&host, config).expect("session should start");
        Self { host, session }
    }

    /// Enter native code, as a call from the runtime would
    pub fn env(&self) -> Env<'_> {
        self.session.enter(&self.host)
    }

    pub fn int(&self, n: i64) -> RawValue {
        self.host.make_int(n)
    }

    pub fn str(&self, s: &str) -> RawValue {
        self.host.make_str(s)
    }

    /// Call a function by name and expect a normal return
    pub fn call_ok(&self, name: &str, args: &[RawValue]) -> RawValue {
        match self.host.call(name, args) {
            Ok(value) => value,
            Err(exit) => panic!(
                "{} exited with {:?} ({:?})",
                name,
                self.host.symbol_name(exit.symbol),
                self.host.exit_message(&exit)
            ),
        }
    }

    /// Call a function by name and expect a non-local exit
    pub fn call_err(&self, name: &str, args: &[RawValue]) -> Exit {
        match self.host.call(name, args) {
            Ok(value) => panic!("{} returned {:?} instead of exiting", name, value),
            Err(exit) => exit,
        }
    }

    pub fn symbol_of(&self, exit: &Exit) -> String {
        self.host.symbol_name(exit.symbol).unwrap_or_default()
    }
}

/// Assert that an exit is a signal of `symbol` whose data mentions `message`
pub fn assert_signal(harness: &Harness, exit: &Exit, symbol: &str, message: &str) {
    assert_eq!(harness.symbol_of(exit), symbol);
    let text = harness.host.exit_message(exit).unwrap_or_default();
    assert!(
        text.contains(message),
        "Expected message containing {:?}, got {:?}",
        message,
        text
    );
}
