//! The per-request aggregate.

use http::StatusCode;

use crate::error::{RelayError, Result};
use crate::event::params::{Params, Query, UserContext};
use crate::event::request::Request;
use crate::event::response::Response;
use crate::route::HandlerVariant;
use crate::sse::SseWriter;

/// Carries request/response state for one HTTP transaction.
///
/// `Event` owns every heap allocation except the `Request`'s body bytes,
/// which are a `bytes::Bytes` the I/O layer produced (cheaply clonable,
/// never mutated). On `reset()`, every owned string in `Params`/`Query`/
/// `UserContext` is dropped, and the backing containers are cleared while
/// retaining capacity so pool reuse is allocation-free.
pub struct Event {
    pub request: Request,
    pub response: Response,
    pub params: Params,
    pub query: Query,
    pub user_context: UserContext,

    sse_started: bool,
    response_sent: bool,
    sse_writer: Option<SseWriter>,
    /// Set by the dispatcher for Stream/StreamWithScheduler routes so the
    /// connection layer knows which handler to invoke for the second
    /// dispatch stage.
    pub(crate) pending_stream_handler: Option<HandlerVariant>,
}

impl Event {
    pub fn new() -> Self {
        Event {
            request: Request::default(),
            response: Response::default(),
            params: Params::new(),
            query: Query::new(),
            user_context: UserContext::new(),
            sse_started: false,
            response_sent: false,
            sse_writer: None,
            pending_stream_handler: None,
        }
    }

    // -- read accessors (borrowed from self, valid until the next reset) --

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn get_query(&self, name: &str) -> Option<&str> {
        self.query.get(name)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn get_context(&self, key: &str) -> Option<&str> {
        self.user_context.get(key)
    }

    pub fn sse_started(&self) -> bool {
        self.sse_started
    }

    pub fn response_sent(&self) -> bool {
        self.response_sent
    }

    pub fn is_finished(&self) -> bool {
        self.response.finished
    }

    // -- mutation --

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.response.set_header(name, value)
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        self.response.set_status(status)
    }

    fn guard_can_send(&self) -> Result<()> {
        if self.sse_started {
            return Err(RelayError::State(
                "cannot send a buffered response after start_sse()".to_string(),
            ));
        }
        if self.response.finished {
            return Err(RelayError::State("response is already finished".to_string()));
        }
        Ok(())
    }

    fn finish_with(&mut self, content_type: &str, body: bytes::Bytes) -> Result<()> {
        self.guard_can_send()?;
        self.response.set_header("Content-Type", content_type)?;
        self.response.set_header("Content-Length", body.len().to_string())?;
        self.response.set_body_and_finish(body)?;
        self.response_sent = true;
        Ok(())
    }

    pub fn send_text(&mut self, bytes: impl Into<bytes::Bytes>) -> Result<()> {
        self.finish_with("text/plain; charset=utf-8", bytes.into())
    }

    pub fn send_html(&mut self, bytes: impl Into<bytes::Bytes>) -> Result<()> {
        self.finish_with("text/html; charset=utf-8", bytes.into())
    }

    pub fn send_json(&mut self, bytes: impl Into<bytes::Bytes>) -> Result<()> {
        self.finish_with("application/json", bytes.into())
    }

    pub fn send_json_value(&mut self, value: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| RelayError::Handler(format!("failed to serialize JSON body: {e}")))?;
        self.finish_with("application/json", bytes::Bytes::from(bytes))
    }

    pub fn redirect(&mut self, location: impl Into<String>, status: StatusCode) -> Result<()> {
        self.guard_can_send()?;
        self.response.set_status(status)?;
        self.response.set_header("Location", location)?;
        self.response.set_body_and_finish(bytes::Bytes::new())?;
        self.response_sent = true;
        Ok(())
    }

    /// `start_sse`: sets SSE response headers and marks
    /// `sse_started`, but does not flush — the wire handoff is performed by
    /// the connection layer (C6).
    pub fn start_sse(&mut self) -> Result<()> {
        if self.response_sent {
            return Err(RelayError::State(
                "cannot start SSE after a buffered response has been sent".to_string(),
            ));
        }
        if self.sse_started {
            return Err(RelayError::State("start_sse() called twice".to_string()));
        }
        self.response.set_header("Content-Type", "text/event-stream")?;
        self.response.set_header("Cache-Control", "no-cache")?;
        self.response.set_header("Connection", "keep-alive")?;
        self.response.set_header("X-Accel-Buffering", "no")?;
        self.sse_started = true;
        Ok(())
    }

    /// Attach the writer the connection layer built after enqueuing the
    /// status line + headers. Called by the connection before retrieving
    /// it again via [`Event::get_sse_writer`] to hand to the handler.
    pub(crate) fn attach_sse_writer(&mut self, writer: SseWriter) {
        self.sse_writer = Some(writer);
    }

    /// `get_sse_writer`: fails with `ConnectionNotReady` unless
    /// the connection has already attached a writer via `start_sse()` +
    /// the C6 streaming handoff.
    pub fn get_sse_writer(&mut self) -> Result<SseWriter> {
        self.sse_writer
            .take()
            .ok_or_else(|| RelayError::State("ConnectionNotReady".to_string()))
    }

    /// `parse_query`: idempotent, clears and repopulates.
    pub fn parse_query(&mut self) {
        if let Some(raw) = self.request.raw_query.clone() {
            self.query.parse(&raw);
        } else {
            self.query.reset();
        }
    }

    /// Return this `Event` to a blank, reusable state: every owned string is dropped, flags cleared, maps
    /// cleared but capacity retained.
    pub fn reset(&mut self) {
        self.request.reset();
        self.response.reset();
        self.params.reset();
        self.query.reset();
        self.user_context.reset();
        self.sse_started = false;
        self.response_sent = false;
        self.sse_writer = None;
        self.pending_stream_handler = None;
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_defaults() {
        let mut e = Event::new();
        e.params.insert("id", "1");
        e.send_text("hi").unwrap();
        assert!(e.is_finished());
        e.reset();
        assert_eq!(e.response.status, StatusCode::OK);
        assert!(e.response.headers.is_empty());
        assert!(e.response.body.is_none());
        assert!(!e.response_sent());
        assert!(!e.is_finished());
        assert!(!e.sse_started());
        assert!(e.params.is_empty());
        assert!(e.query.is_empty());
    }

    #[test]
    fn send_after_sse_started_is_rejected() {
        let mut e = Event::new();
        e.start_sse().unwrap();
        assert!(e.send_text("nope").is_err());
    }

    #[test]
    fn sse_after_send_is_rejected() {
        let mut e = Event::new();
        e.send_text("ok").unwrap();
        assert!(e.start_sse().is_err());
    }

    #[test]
    fn get_sse_writer_before_attach_is_connection_not_ready() {
        let mut e = Event::new();
        e.start_sse().unwrap();
        let err = e.get_sse_writer().unwrap_err();
        assert!(matches!(err, RelayError::State(_)));
    }
}
