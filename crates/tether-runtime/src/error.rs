//! Failures that cross the native/foreign boundary

use crate::value::GlobalValue;
use std::io;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between native code and the foreign runtime
///
/// How each case becomes a foreign-visible signal is decided in
/// [`crate::ffi::safety`].
#[derive(Debug, Error)]
pub enum Error {
    /// Symbol name the runtime cannot represent
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Error raised by native code with a message
    #[error("{0}")]
    Custom(String),

    /// Foreign value of the wrong runtime type
    #[error("Wrong type: expected {expected}, got {actual}")]
    WrongType {
        expected: String,
        actual: String,
        /// Offending value, when it could be retained
        value: Option<GlobalValue>,
    },

    /// Error signaled by the foreign side, to be re-raised verbatim
    #[error("Foreign signal")]
    ForeignSignal {
        symbol: GlobalValue,
        data: GlobalValue,
    },

    /// Non-local transfer started by the foreign side, to be re-thrown verbatim
    #[error("Foreign throw")]
    ForeignThrow { tag: GlobalValue, value: GlobalValue },

    /// Argument count differs from the registered arity (contract violation)
    #[error("Arity mismatch: expected {expected} argument{}, got {actual}", plural(.expected))]
    Arity { expected: usize, actual: usize },

    /// Push onto a channel that has no transport
    #[error("Channel {0:?} is not open")]
    ChannelNotOpen(String),

    /// Writing a notification failed
    #[error("Notification transport failed: {0}")]
    Transport(#[from] io::Error),

    /// Any other native fault, including caught panics
    #[error("Unknown native fault: {0}")]
    Unknown(String),
}

fn plural(count: &usize) -> &'static str {
    if *count == 1 {
        ""
    } else {
        "s"
    }
}

impl Error {
    /// Shorthand for [`Error::Custom`]
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// A wrong-type error without a retained value
    pub fn wrong_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::WrongType {
            expected: expected.into(),
            actual: actual.into(),
            value: None,
        }
    }

    /// Whether this error originated on the foreign side
    pub fn is_foreign(&self) -> bool {
        matches!(self, Error::ForeignSignal { .. } | Error::ForeignThrow { .. })
    }
}
