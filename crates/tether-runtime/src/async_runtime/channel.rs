//! Callback channels from background threads to the runtime's thread
//!
//! A `Channel` pairs a [`CallbackStack`] with a one-directional notification
//! pipe owned by the runtime. Producers on any thread push a callback: it is
//! stored under a fresh handle and the handle is written to the pipe. The
//! runtime's main loop reads the pipe and calls the channel's relay function,
//! which decodes the handles and fires them in stream order on its own
//! thread.
//!
//! The stack lock is held while the notification is written, so handles
//! reach the pipe in the order they were issued. Lock order is always stack
//! before sink.

use crate::api::datum::Datum;
use crate::api::native::FunctionBuilder;
use crate::async_runtime::notify::{encode, NotificationDecoder};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::ffi::callbacks::{Callback, CallbackHandle, CallbackStack, FireOutcome};
use crate::session::SessionConfig;
use crate::value::GlobalValue;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Lifecycle of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, not yet connected to the runtime
    Created,
    /// Accepting pushes
    Open,
    /// Torn down; pending callbacks were discarded
    Closed,
}

enum Sink {
    Created,
    Open(Box<dyn Write + Send>),
    Closed,
}

/// Delivers callbacks pushed from any thread onto the runtime's thread
pub struct Channel {
    name: String,
    stack: CallbackStack,
    sink: Mutex<Sink>,
    decoder: Mutex<NotificationDecoder>,
    warn_on_leak: bool,
}

impl Channel {
    /// Create a channel with default settings
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::build(name.into(), &SessionConfig::default())
    }

    /// Create a channel following a session's settings
    ///
    /// The channel name is prefixed with the module name.
    pub fn with_config(name: impl AsRef<str>, config: &SessionConfig) -> Arc<Self> {
        Self::build(format!("{}/{}", config.module_name, name.as_ref()), config)
    }

    fn build(name: String, config: &SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            name,
            stack: CallbackStack::with_compaction(config.compact_when_empty),
            sink: Mutex::new(Sink::Created),
            decoder: Mutex::new(NotificationDecoder::new()),
            warn_on_leak: config.warn_on_leak,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        match &*self.sink.lock() {
            Sink::Created => ChannelState::Created,
            Sink::Open(_) => ChannelState::Open,
            Sink::Closed => ChannelState::Closed,
        }
    }

    /// Connect the channel to the runtime
    ///
    /// Registers an anonymous relay function and asks the runtime for a pipe
    /// whose contents it will pass to the relay. The relay only holds a weak
    /// reference, so dropping every `Arc<Channel>` turns it into a no-op.
    pub fn open<'e>(self: &Arc<Self>, env: &'e Env<'e>) -> Result<()> {
        if self.state() != ChannelState::Created {
            return Err(Error::custom(format!(
                "Channel {:?} cannot be opened twice",
                self.name
            )));
        }

        let weak = Arc::downgrade(self);
        let relay = FunctionBuilder::anonymous()
            .doc(format!("Deliver pending callbacks of channel {}.", self.name))
            .build_with_env(env, move |env: &Env<'_>, chunk: String| -> Result<()> {
                match weak.upgrade() {
                    Some(channel) => channel.drain(env, chunk.as_bytes()).map(|_| ()),
                    None => Ok(()),
                }
            })?;

        let writer = env.host().open_channel(relay.raw())?;
        env.check(())?;
        *self.sink.lock() = Sink::Open(writer);

        debug!(channel = %self.name, "channel opened");
        Ok(())
    }

    /// Queue a callback and notify the runtime
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotOpen`] before `open` or after `close`
    /// - [`Error::Transport`] if the notification could not be written
    ///
    /// On error the callback is dropped without running.
    pub fn push(&self, callback: Callback) -> Result<CallbackHandle> {
        self.stack.push_then(callback, |handle| -> Result<()> {
            let mut sink = self.sink.lock();
            match &mut *sink {
                Sink::Open(writer) => {
                    writer.write_all(encode(handle).as_bytes())?;
                    writer.flush()?;
                    Ok(())
                }
                Sink::Created | Sink::Closed => Err(Error::ChannelNotOpen(self.name.clone())),
            }
        })
    }

    /// Queue a foreign function call with thread-safe arguments
    pub fn push_foreign(&self, function: Arc<GlobalValue>, args: Vec<Datum>) -> Result<CallbackHandle> {
        self.push(Callback::foreign(function, args))
    }

    /// Decode a chunk of notifications and fire the handles it completes
    ///
    /// Every handle is fired even if an earlier callback fails; the first
    /// failure is returned and later ones are logged. Returns how many
    /// callbacks ran.
    pub fn drain<'e>(&self, env: &'e Env<'e>, chunk: &[u8]) -> Result<usize> {
        let handles = self.decoder.lock().feed(chunk);

        let mut delivered = 0;
        let mut first_error = None;
        for handle in handles {
            match self.stack.fire(handle, env) {
                Ok(FireOutcome::Delivered) => delivered += 1,
                Ok(FireOutcome::Unknown) => {}
                Err(err) => {
                    delivered += 1;
                    if first_error.is_none() {
                        first_error = Some(err);
                    } else {
                        error!(channel = %self.name, %handle, error = %err, "callback failed");
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }

    /// Build a producer that pushes `f(arg)` for every call
    ///
    /// The producer is `Send + Sync` and can be handed to any thread.
    pub fn callback<A, F>(self: &Arc<Self>, f: F) -> impl Fn(A) -> Result<CallbackHandle> + Send + Sync
    where
        A: Send + 'static,
        F: Fn(&Env<'_>, A) -> Result<()> + Send + Sync + 'static,
    {
        let channel = Arc::clone(self);
        let f = Arc::new(f);
        move |arg: A| {
            let f = Arc::clone(&f);
            channel.push(Callback::thunk(move |env| f(env, arg)))
        }
    }

    /// Build a producer that calls a foreign function with the given arguments
    pub fn foreign_callback(
        self: &Arc<Self>,
        function: Arc<GlobalValue>,
    ) -> impl Fn(Vec<Datum>) -> Result<CallbackHandle> + Send + Sync {
        let channel = Arc::clone(self);
        move |args: Vec<Datum>| channel.push_foreign(Arc::clone(&function), args)
    }

    /// Callbacks pushed but not yet fired
    pub fn pending(&self) -> usize {
        self.stack.len()
    }

    /// Disconnect the transport and discard pending callbacks
    ///
    /// Returns how many callbacks were discarded.
    pub fn close(&self) -> usize {
        let previous = std::mem::replace(&mut *self.sink.lock(), Sink::Closed);
        drop(previous);

        let discarded = self.stack.discard();
        if discarded > 0 && self.warn_on_leak {
            warn!(channel = %self.name, discarded, "channel closed with pending callbacks");
        }
        debug!(channel = %self.name, "channel closed");
        discarded
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let pending = self.stack.len();
        if pending > 0 && self.warn_on_leak {
            warn!(channel = %self.name, pending, "channel dropped with pending callbacks");
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}
