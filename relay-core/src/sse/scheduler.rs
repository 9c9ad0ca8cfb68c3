//! Scheduler handle: an opaque capability to register timed callbacks on a
//! connection's event loop.
//!
//! `StreamWithScheduler` handlers use this instead of a blocking sleep to
//! emit events over time — the design explicitly forbids blocking the
//! worker's event loop.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Capability handed to `StreamWithScheduler` handlers for registering
/// timer-driven callbacks on the connection's worker runtime.
#[derive(Clone)]
pub struct SchedulerHandle {
    runtime: tokio::runtime::Handle,
}

impl SchedulerHandle {
    pub(crate) fn new(runtime: tokio::runtime::Handle) -> Self {
        SchedulerHandle { runtime }
    }

    /// Run `callback` every `period`, starting after the first tick. The
    /// returned `JoinHandle` can be aborted by the caller; dropping it
    /// leaves the interval running.
    pub fn spawn_interval<F>(&self, period: Duration, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                callback();
            }
        })
    }

    /// Run an arbitrary future on the connection's worker runtime without
    /// blocking the caller.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future)
    }
}
