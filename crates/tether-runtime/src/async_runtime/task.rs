//! Spawning background work that reports back through a channel
//!
//! The future runs on tokio; its output is moved into a callback that runs on
//! the runtime's thread once the channel is drained. The join handle resolves
//! to the callback's handle, or to the push error if the channel was closed
//! in the meantime.

use crate::async_runtime::channel::Channel;
use crate::async_runtime::runtime;
use crate::env::Env;
use crate::error::Result;
use crate::ffi::callbacks::{Callback, CallbackHandle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

impl Channel {
    /// Run `future` on `handle` and deliver its output with `deliver`
    pub fn spawn_on<T, Fut, F>(
        self: &Arc<Self>,
        handle: &Handle,
        future: Fut,
        deliver: F,
    ) -> JoinHandle<Result<CallbackHandle>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(&Env<'_>, T) -> Result<()> + Send + 'static,
    {
        let channel = Arc::clone(self);
        handle.spawn(async move {
            let output = future.await;
            trace!(channel = %channel.name(), "background task finished");
            channel.push(Callback::thunk(move |env| deliver(env, output)))
        })
    }

    /// Run `future` on the global tokio runtime and deliver its output
    pub fn spawn<T, Fut, F>(self: &Arc<Self>, future: Fut, deliver: F) -> Result<JoinHandle<Result<CallbackHandle>>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(&Env<'_>, T) -> Result<()> + Send + 'static,
    {
        let handle = runtime()?.handle().clone();
        Ok(self.spawn_on(&handle, future, deliver))
    }

    /// Run blocking work on tokio's blocking pool and deliver its output
    pub fn spawn_blocking<T, W, F>(self: &Arc<Self>, work: W, deliver: F) -> Result<JoinHandle<Result<CallbackHandle>>>
    where
        W: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        F: FnOnce(&Env<'_>, T) -> Result<()> + Send + 'static,
    {
        let handle = runtime()?.handle().clone();
        let channel = Arc::clone(self);
        Ok(handle.spawn_blocking(move || {
            let output = work();
            channel.push(Callback::thunk(move |env| deliver(env, output)))
        }))
    }

    /// Run `deliver` on the runtime's thread once `delay` has passed
    pub fn after<F>(self: &Arc<Self>, delay: Duration, deliver: F) -> Result<JoinHandle<Result<CallbackHandle>>>
    where
        F: FnOnce(&Env<'_>) -> Result<()> + Send + 'static,
    {
        self.spawn(
            async move { tokio::time::sleep(delay).await },
            move |env, ()| deliver(env),
        )
    }
}
