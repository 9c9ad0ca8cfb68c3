//! "Fast" middleware: fixed-capacity, pre-only, no continuation object.
//!
//! Trades post-step hooks for zero per-call overhead: no `Next` to
//! allocate, just a plain iteration that checks `response.finished` after
//! each call and falls through to the final handler.

use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::event::Event;
use crate::route::{BoxFuture, RegularHandler};

/// Default capacity of a [`FastChain`].
pub const DEFAULT_FAST_CAPACITY: usize = 32;

/// A single pre-only middleware step (`fn(event) -> Result`).
pub trait FastMiddleware: Send + Sync {
    fn call(&self, event: Event) -> BoxFuture<Result<Event>>;
}

impl<F, Fut> FastMiddleware for F
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Event>> + Send + 'static,
{
    fn call(&self, event: Event) -> BoxFuture<Result<Event>> {
        Box::pin((self)(event))
    }
}

/// Fixed-capacity, pre-only middleware chain.
#[derive(Clone)]
pub struct FastChain {
    steps: Arc<Vec<Arc<dyn FastMiddleware>>>,
    capacity: usize,
    handler: Arc<dyn RegularHandler>,
}

impl FastChain {
    /// Build a chain, rejecting registration past `capacity` up front
    /// (default 32) rather than at request time.
    pub fn new(
        steps: Vec<Arc<dyn FastMiddleware>>,
        handler: Arc<dyn RegularHandler>,
        capacity: usize,
    ) -> Result<Self> {
        if steps.len() > capacity {
            return Err(RelayError::State(format!(
                "fast middleware chain exceeds capacity {capacity} (has {})",
                steps.len()
            )));
        }
        Ok(FastChain { steps: Arc::new(steps), capacity, handler })
    }

    pub fn with_default_capacity(steps: Vec<Arc<dyn FastMiddleware>>, handler: Arc<dyn RegularHandler>) -> Result<Self> {
        Self::new(steps, handler, DEFAULT_FAST_CAPACITY)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn run(self, mut event: Event) -> Result<Event> {
        for step in self.steps.iter() {
            event = step.call(event).await?;
            if event.is_finished() {
                return Ok(event);
            }
        }
        self.handler.call(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as RResult;

    fn handler() -> Arc<dyn RegularHandler> {
        Arc::new(|mut e: Event| async move {
            e.send_text("handled")?;
            RResult::Ok(e)
        })
    }

    #[tokio::test]
    async fn falls_through_to_handler_when_no_step_finishes() {
        let step: Arc<dyn FastMiddleware> = Arc::new(|e: Event| async move { RResult::Ok(e) });
        let chain = FastChain::with_default_capacity(vec![step], handler()).unwrap();
        let result = chain.run(Event::new()).await.unwrap();
        assert_eq!(result.response.body.unwrap().bytes.as_ref(), b"handled");
    }

    #[tokio::test]
    async fn finishing_step_short_circuits_handler() {
        let step: Arc<dyn FastMiddleware> = Arc::new(|mut e: Event| async move {
            e.send_text("stopped")?;
            RResult::Ok(e)
        });
        let chain = FastChain::with_default_capacity(vec![step], handler()).unwrap();
        let result = chain.run(Event::new()).await.unwrap();
        assert_eq!(result.response.body.unwrap().bytes.as_ref(), b"stopped");
    }

    #[test]
    fn exceeding_capacity_is_rejected_at_construction() {
        let steps: Vec<Arc<dyn FastMiddleware>> =
            (0..3).map(|_| Arc::new(|e: Event| async move { RResult::Ok(e) }) as Arc<dyn FastMiddleware>).collect();
        assert!(FastChain::new(steps, handler(), 2).is_err());
    }
}
