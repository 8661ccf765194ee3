//! FFI type system - raw handles exchanged with the foreign runtime
//!
//! Defines:
//! - `RawValue`: an uninterpreted handle to a runtime-owned value
//! - `ExitKind`: the runtime's pending non-local exit state
//! - `Finalizer`: release hook attached to user pointers
//! - `Subr`: the uniform entry point every native function is registered through

use crate::ffi::host::Host;
use std::fmt;
use std::os::raw::c_void;

/// Opaque handle to a value owned by the foreign runtime
///
/// Native code never looks inside; it only hands the handle back to [`Host`]
/// primitives or compares two handles for identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(usize);

impl RawValue {
    /// Wrap a runtime-specific handle word
    pub const fn from_bits(bits: usize) -> Self {
        RawValue(bits)
    }

    /// The runtime-specific handle word
    pub const fn bits(self) -> usize {
        self.0
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawValue({:#x})", self.0)
    }
}

/// Pending non-local exit state reported by the runtime after any primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Normal return, nothing pending
    Return,
    /// An error signal (symbol + data) is pending
    Signal,
    /// A tagged non-local transfer (tag + value) is pending
    Throw,
}

/// Release hook the runtime calls exactly once when it frees a user pointer
pub type Finalizer = unsafe extern "C" fn(*mut c_void);

/// Uniform entry point of a registered function
///
/// The boxed closure is the function's payload: the runtime owns it for as
/// long as the function value lives and calls it with the arguments of every
/// invocation.
pub type Subr = Box<dyn Fn(&dyn Host, &[RawValue]) -> RawValue>;
