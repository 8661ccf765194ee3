//! Pending callbacks waiting to run on the runtime's thread
//!
//! Any thread may push a callback and receive a numeric handle. The runtime's
//! thread later fires the handle, which removes the callback and runs it
//! exactly once. Handles are allocated from a counter that only grows, so a
//! fired handle is never reused.

use crate::api::conversion::IntoForeign;
use crate::api::datum::Datum;
use crate::env::Env;
use crate::error::Result;
use crate::value::GlobalValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{trace, warn};

/// Numeric handle of a pending callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(u64);

impl CallbackHandle {
    pub const fn from_index(index: u64) -> Self {
        CallbackHandle(index)
    }

    pub const fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CallbackHandle {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(CallbackHandle)
    }
}

/// Deferred work that runs once on the runtime's thread
pub enum Callback {
    /// A native closure, given an env when it fires
    Thunk(Box<dyn FnOnce(&Env<'_>) -> Result<()> + Send>),
    /// A retained foreign function, called with the converted arguments
    Foreign {
        function: Arc<GlobalValue>,
        args: Vec<Datum>,
    },
}

impl Callback {
    pub fn thunk<F>(f: F) -> Self
    where
        F: FnOnce(&Env<'_>) -> Result<()> + Send + 'static,
    {
        Callback::Thunk(Box::new(f))
    }

    pub fn foreign(function: Arc<GlobalValue>, args: Vec<Datum>) -> Self {
        Callback::Foreign { function, args }
    }

    pub(crate) fn invoke<'e>(self, env: &'e Env<'e>) -> Result<()> {
        match self {
            Callback::Thunk(f) => f(env),
            Callback::Foreign { function, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| arg.into_foreign(env))
                    .collect::<Result<Vec<_>>>()?;
                env.call(function, args.as_slice())?;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Thunk(_) => f.write_str("Callback::Thunk"),
            Callback::Foreign { function, args } => f
                .debug_struct("Callback::Foreign")
                .field("function", function)
                .field("args", args)
                .finish(),
        }
    }
}

/// What firing a handle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The callback was removed and ran
    Delivered,
    /// No callback was pending under the handle
    Unknown,
}

struct StackInner {
    next: u64,
    pending: HashMap<u64, Callback>,
}

/// Thread-safe registry of pending callbacks
pub struct CallbackStack {
    inner: Mutex<StackInner>,
    compact_when_empty: bool,
}

impl CallbackStack {
    pub fn new() -> Self {
        Self::with_compaction(true)
    }

    /// `compact` releases the storage whenever the last callback fires
    pub fn with_compaction(compact: bool) -> Self {
        Self {
            inner: Mutex::new(StackInner {
                next: 0,
                pending: HashMap::new(),
            }),
            compact_when_empty: compact,
        }
    }

    /// Store a callback and return its fresh handle
    pub fn push(&self, callback: Callback) -> CallbackHandle {
        let mut inner = self.inner.lock();
        let handle = CallbackHandle(inner.next);
        inner.next += 1;
        inner.pending.insert(handle.0, callback);
        handle
    }

    /// Store a callback and run `notify` with its handle under the same lock
    ///
    /// Notifications for concurrent pushes are therefore emitted in handle
    /// order. If `notify` fails the callback is removed again.
    pub fn push_then<E, N>(&self, callback: Callback, notify: N) -> std::result::Result<CallbackHandle, E>
    where
        N: FnOnce(CallbackHandle) -> std::result::Result<(), E>,
    {
        let mut inner = self.inner.lock();
        let handle = CallbackHandle(inner.next);
        inner.next += 1;
        inner.pending.insert(handle.0, callback);

        if let Err(err) = notify(handle) {
            let rolled_back = inner.pending.remove(&handle.0);
            drop(inner);
            drop(rolled_back);
            return Err(err);
        }
        Ok(handle)
    }

    /// Remove and run the callback stored under `handle`
    ///
    /// The callback runs outside the lock, so it may push new callbacks.
    /// Firing an unknown or already fired handle is a logged no-op.
    pub fn fire<'e>(&self, handle: CallbackHandle, env: &'e Env<'e>) -> Result<FireOutcome> {
        let callback = {
            let mut inner = self.inner.lock();
            let callback = inner.pending.remove(&handle.0);
            if self.compact_when_empty && inner.pending.is_empty() && inner.pending.capacity() > 0 {
                inner.pending = HashMap::new();
            }
            callback
        };

        match callback {
            Some(callback) => {
                trace!(%handle, "firing callback");
                callback.invoke(env)?;
                Ok(FireOutcome::Delivered)
            }
            None => {
                warn!(%handle, "no pending callback for handle");
                Ok(FireOutcome::Unknown)
            }
        }
    }

    pub fn contains(&self, handle: CallbackHandle) -> bool {
        self.inner.lock().pending.contains_key(&handle.0)
    }

    /// Number of callbacks not yet fired
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle the next push will receive
    pub fn next_handle(&self) -> CallbackHandle {
        CallbackHandle(self.inner.lock().next)
    }

    /// Drop every pending callback without running it; returns how many
    pub fn discard(&self) -> usize {
        let pending = std::mem::take(&mut self.inner.lock().pending);
        pending.len()
    }
}

impl Default for CallbackStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CallbackStack")
            .field("next", &inner.next)
            .field("pending", &inner.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::loopback::Loopback;
    use crate::session::{Session, SessionConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handle_text_form() {
        let handle = CallbackHandle::from_index(17);
        assert_eq!(handle.to_string(), "17");
        assert_eq!("17".parse::<CallbackHandle>().unwrap(), handle);
        assert!("x".parse::<CallbackHandle>().is_err());
    }

    #[test]
    fn test_handles_are_monotonic() {
        let stack = CallbackStack::new();
        let a = stack.push(Callback::thunk(|_| Ok(())));
        let b = stack.push(Callback::thunk(|_| Ok(())));
        assert!(b > a);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.discard(), 2);
        let c = stack.push(Callback::thunk(|_| Ok(())));
        assert!(c > b);
    }

    #[test]
    fn test_fire_runs_once() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let stack = CallbackStack::new();
        let handle = stack.push(Callback::thunk(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert_eq!(stack.fire(handle, &env).unwrap(), FireOutcome::Delivered);
        assert_eq!(stack.fire(handle, &env).unwrap(), FireOutcome::Unknown);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_failed_notify_rolls_back() {
        let stack = CallbackStack::new();
        let result = stack.push_then(Callback::thunk(|_| Ok(())), |_| Err("pipe closed"));
        assert_eq!(result.unwrap_err(), "pipe closed");
        assert!(stack.is_empty());
        // The counter still advanced
        assert_eq!(stack.next_handle(), CallbackHandle::from_index(1));
    }

    #[test]
    fn test_callback_error_propagates() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let stack = CallbackStack::new();
        let handle = stack.push(Callback::thunk(|_| Err(Error::custom("late failure"))));
        assert!(matches!(stack.fire(handle, &env), Err(Error::Custom(_))));
        assert!(!stack.contains(handle));
    }

    #[test]
    fn test_callback_may_push_while_firing() {
        let host = Loopback::new();
        let session = Session::new(SessionConfig::default());
        let env = session.enter(&host);

        let stack = Arc::new(CallbackStack::new());
        let inner = Arc::clone(&stack);
        let handle = stack.push(Callback::thunk(move |_| {
            inner.push(Callback::thunk(|_| Ok(())));
            Ok(())
        }));
        stack.fire(handle, &env).unwrap();
        assert_eq!(stack.len(), 1);
    }
}
