//! Re-entrant `next(index)` middleware chain.
//!
//! Each middleware gets a [`Next`] continuation rather than calling the
//! next middleware directly. `Next` carries the chain (by `Arc`, cloned by
//! value — never a reference) and the next index to run, so recursive
//! invocation works without aliasing the chain.

use std::sync::Arc;

use crate::error::Result;
use crate::event::Event;
use crate::route::{BoxFuture, RegularHandler};

/// One middleware in a [`Chain`]. A middleware does pre-handler work, calls
/// `next.call(event)`, then may do post-handler work with the event the
/// inner chain handed back — a re-entrant continuation object rather than
/// a single linear pass, so pre- and post-handler logic can live in the
/// same middleware.
pub trait Middleware: Send + Sync {
    fn call(&self, event: Event, next: Next) -> BoxFuture<Result<Event>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Event, Next) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Event>> + Send + 'static,
{
    fn call(&self, event: Event, next: Next) -> BoxFuture<Result<Event>> {
        Box::pin((self)(event, next))
    }
}

/// The continuation a middleware calls to run the rest of the chain.
#[derive(Clone)]
pub struct Next {
    chain: Chain,
    index: usize,
}

impl Next {
    /// Run the remainder of the chain starting at this continuation's
    /// index. Short-circuits if `event.response` is already
    /// `finished` — later middlewares and the final handler are skipped,
    /// but the caller's post-step code still executes once this future
    /// resolves, since that code lives in the caller's own stack frame.
    pub fn call(self, event: Event) -> BoxFuture<Result<Event>> {
        self.chain.dispatch(self.index, event)
    }
}

/// Ordered middleware list with a terminal handler.
///
/// Registration order is execution order. Constructed once per server
/// setup and cloned cheaply (both fields are `Arc`) for each in-flight
/// request, since the terminal handler differs per matched route.
#[derive(Clone)]
pub struct Chain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
    handler: Arc<dyn RegularHandler>,
}

impl Chain {
    pub fn new(middlewares: Arc<Vec<Arc<dyn Middleware>>>, handler: Arc<dyn RegularHandler>) -> Self {
        Chain { middlewares, handler }
    }

    /// Run the whole chain from the first middleware.
    pub fn run(self, event: Event) -> BoxFuture<Result<Event>> {
        self.dispatch(0, event)
    }

    fn dispatch(&self, index: usize, event: Event) -> BoxFuture<Result<Event>> {
        if event.is_finished() {
            // Short-circuit: a prior middleware already
            // finished the response. Neither the remaining middlewares
            // nor the final handler run.
            return Box::pin(async move { Ok(event) });
        }
        if index >= self.middlewares.len() {
            return self.handler.call(event);
        }
        let next = Next { chain: self.clone(), index: index + 1 };
        self.middlewares[index].call(event, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as RResult;
    use std::sync::Mutex;

    fn recording_handler(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Arc<dyn RegularHandler> {
        Arc::new(move |mut e: Event| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(tag);
                e.send_text("handled")?;
                RResult::Ok(e)
            }
        })
    }

    fn recording_middleware(
        log: Arc<Mutex<Vec<&'static str>>>,
        pre_tag: &'static str,
        post_tag: &'static str,
    ) -> Arc<dyn Middleware> {
        Arc::new(move |e: Event, next: Next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(pre_tag);
                let e = next.call(e).await?;
                log.lock().unwrap().push(post_tag);
                RResult::Ok(e)
            }
        })
    }

    #[tokio::test]
    async fn ordering_is_m1_pre_m2_pre_handler_m2_post_m1_post() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let m1 = recording_middleware(log.clone(), "m1.pre", "m1.post");
        let m2 = recording_middleware(log.clone(), "m2.pre", "m2.post");
        let chain = Chain::new(Arc::new(vec![m1, m2]), recording_handler(log.clone(), "handler"));
        chain.run(Event::new()).await.unwrap();

        let observed = log.lock().unwrap().clone();
        assert_eq!(observed, vec!["m1.pre", "m2.pre", "handler", "m2.post", "m1.post"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_later_middleware_and_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let finishing: Arc<dyn Middleware> = Arc::new(move |mut e: Event, next: Next| async move {
            e.send_text("short-circuited")?;
            next.call(e).await
        });
        let m2 = recording_middleware(log.clone(), "m2.pre", "m2.post");
        let chain = Chain::new(Arc::new(vec![finishing, m2]), recording_handler(log.clone(), "handler"));
        let result = chain.run(Event::new()).await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(result.response.body.unwrap().bytes.as_ref(), b"short-circuited");
    }
}
