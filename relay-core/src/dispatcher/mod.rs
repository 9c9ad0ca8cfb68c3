//! Orchestrates the per-request lifecycle: request hook -> query parse ->
//! route lookup -> middleware -> handler -> response hook.

use std::sync::Arc;

use crate::error::{RelayError, Result};
use crate::event::Event;
use crate::middleware::{Chain, FastChain};
use crate::route::{HandlerVariant, Method, Router};

/// Hook signature shared by `on_request`/`on_response`: takes and returns
/// an owned `Event`.
pub type EventHook = Arc<dyn Fn(Event) -> crate::route::BoxFuture<Result<Event>> + Send + Sync>;

/// `on_error` hook: given the event and the error that aborted
/// dispatch, produce a finished response.
pub type ErrorHook =
    Arc<dyn Fn(Event, RelayError) -> crate::route::BoxFuture<Result<Event>> + Send + Sync>;

/// Which middleware execution strategy a [`Dispatcher`] uses for regular
/// (buffered-response) routes.
#[derive(Clone)]
pub enum MiddlewareMode {
    /// Re-entrant `next()` chain (C4 default): supports pre- and
    /// post-handler logic per middleware.
    Chain(Arc<Vec<Arc<dyn crate::middleware::Middleware>>>),
    /// Fixed-capacity pre-only chain.
    Fast(Arc<Vec<Arc<dyn crate::middleware::FastMiddleware>>>, usize),
}

/// Drives one request through route lookup, middleware, and hooks.
pub struct Dispatcher {
    router: Arc<Router>,
    middleware: MiddlewareMode,
    on_request: Option<EventHook>,
    on_response: Option<EventHook>,
    on_error: Option<ErrorHook>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, middleware: MiddlewareMode) -> Self {
        Dispatcher { router, middleware, on_request: None, on_response: None, on_error: None }
    }

    pub fn set_on_request(&mut self, hook: EventHook) {
        self.on_request = Some(hook);
    }

    pub fn set_on_response(&mut self, hook: EventHook) {
        self.on_response = Some(hook);
    }

    pub fn set_on_error(&mut self, hook: ErrorHook) {
        self.on_error = Some(hook);
    }

    /// Run the full per-request lifecycle. Always returns an
    /// `Event` — lookup misses and handler errors are turned into a
    /// finished response rather than propagated, except when an
    /// `on_error` hook itself fails (bubbled to the connection layer,
    /// which maps it to a transport-level close).
    pub async fn dispatch(&self, method: Method, path: String, mut event: Event) -> Result<Event> {
        // Step 1: on_request hook.
        if let Some(hook) = &self.on_request {
            match hook(event).await {
                Ok(e) => event = e,
                Err(err) => return self.recover(event_after_hook_failure(), err).await,
            }
        }

        // Step 2: best-effort query parse; failures are not fatal.
        event.parse_query();

        // Step 3/4: route lookup + param copy.
        let looked_up = self.router.lookup(method, &path);
        let event = match looked_up {
            Ok(Some(matched)) => {
                for (k, v) in matched.params.iter() {
                    event.params.insert(k.to_string(), v.to_string());
                }
                match self.dispatch_matched(matched.handler.clone(), event).await {
                    Ok(e) => e,
                    Err(err) => return self.recover(Event::new(), err).await,
                }
            }
            Ok(None) => {
                log::debug!("no route matched {method} {path}");
                let mut event = event;
                let _ = event.set_status(http::StatusCode::NOT_FOUND);
                let _ = event.send_text("Not Found");
                event
            }
            Err(err) => return self.recover(event, err).await,
        };

        // Step 6: on_response hook.
        let event = if let Some(hook) = &self.on_response {
            match hook(event).await {
                Ok(e) => e,
                Err(err) => return self.recover(Event::new(), err).await,
            }
        } else {
            event
        };

        Ok(event)
    }

    async fn dispatch_matched(&self, handler: HandlerVariant, mut event: Event) -> Result<Event> {
        match handler {
            HandlerVariant::Regular(regular) => {
                let chain_result = match &self.middleware {
                    MiddlewareMode::Chain(middlewares) => {
                        Chain::new(middlewares.clone(), regular).run(event).await
                    }
                    MiddlewareMode::Fast(steps, capacity) => {
                        FastChain::new((**steps).clone(), regular, *capacity)?.run(event).await
                    }
                };
                chain_result
            }
            // Stream/StreamWithScheduler: start SSE headers and stash the
            // handler for the connection layer's second dispatch stage.
            // The handler is deliberately NOT invoked here.
            variant @ (HandlerVariant::Stream(_) | HandlerVariant::StreamWithScheduler(_)) => {
                event.start_sse()?;
                event.pending_stream_handler = Some(variant);
                Ok(event)
            }
        }
    }

    /// Map a dispatch-time error to a finished response via `on_error` if
    /// configured, else the default status/body mapping.
    async fn recover(&self, event: Event, err: RelayError) -> Result<Event> {
        if let Some(hook) = &self.on_error {
            return hook(event, err).await;
        }
        let mut event = event;
        let status = err.status();
        let body = err.default_body();
        log::warn!("dispatch error, responding {status}: {err}");
        if !event.is_finished() {
            let _ = event.set_status(status);
            let _ = event.send_text(body);
        }
        Ok(event)
    }
}

/// Placeholder event used only when a prior `Event` was already consumed
/// by a failing hook and the caller needs *an* `Event` to finish an error
/// response on. The connection layer's own `Event` (from the pool) is
/// still the one written to the wire; this one never leaves the
/// dispatcher.
fn event_after_hook_failure() -> Event {
    Event::new()
}
