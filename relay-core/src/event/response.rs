//! Mutable response builder.

use http::StatusCode;

use crate::error::{RelayError, Result};
use crate::event::headers::Headers;

/// A response body. `owned` is tracked even though this implementation
/// always owns the bytes it stores — a placeholder for a future zero-copy
/// body type, asserted in debug builds.
#[derive(Debug, Clone)]
pub struct Body {
    pub bytes: bytes::Bytes,
    pub owned: bool,
}

/// The mutable per-request response builder.
///
/// `sent` means headers+body have actually been written to the peer
/// (set via `mark_sent` by the connection layer after its write to the
/// socket succeeds, never by `Event`/`Response` themselves). `finished`
/// is the terminal flag: once true, no further mutation of status,
/// headers, or body is permitted, independent of whether the bytes have
/// reached the wire yet.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Option<Body>,
    pub sent: bool,
    pub finished: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: StatusCode::OK,
            headers: Headers::new(),
            body: None,
            sent: false,
            finished: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// `set_status`: fails if the response is already finished.
    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        self.guard_mutable()?;
        self.status = status;
        Ok(())
    }

    /// `set_header`: copies both name and value; fails if
    /// finished.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.guard_mutable()?;
        self.headers.set(name, value);
        Ok(())
    }

    /// Set the body and mark the response finished. Does not check
    /// `sse_started`; the caller (`Event`) is responsible for that
    /// invariant since `Response` doesn't know about SSE state.
    pub fn set_body_and_finish(&mut self, bytes: bytes::Bytes) -> Result<()> {
        self.guard_mutable()?;
        self.body = Some(Body { bytes, owned: true });
        self.finished = true;
        Ok(())
    }

    /// Mark the response as having actually been written to the peer.
    /// Called by the connection layer once its write to the socket
    /// succeeds; never called from handler code.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    fn guard_mutable(&self) -> Result<()> {
        if self.finished {
            return Err(RelayError::State(
                "response is finished; no further mutation is permitted".to_string(),
            ));
        }
        Ok(())
    }

    /// Reset to a fresh 200-with-no-body response, retaining the headers
    /// map's capacity.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.reset();
        self.body = None;
        self.sent = false;
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_response_matches_defaults() {
        let r = Response::new();
        assert_eq!(r.status, StatusCode::OK);
        assert!(r.headers.is_empty());
        assert!(r.body.is_none());
        assert!(!r.sent);
        assert!(!r.finished);
    }

    #[test]
    fn mutation_after_finish_is_rejected() {
        let mut r = Response::new();
        r.set_body_and_finish(bytes::Bytes::from_static(b"hi")).unwrap();
        assert!(r.finished);
        assert!(!r.sent);
        assert!(r.set_header("x", "y").is_err());
        assert!(r.set_status(StatusCode::NOT_FOUND).is_err());
    }

    #[test]
    fn mark_sent_is_independent_of_finish() {
        let mut r = Response::new();
        r.mark_sent();
        assert!(r.sent);
        assert!(!r.finished);
        r.set_body_and_finish(bytes::Bytes::from_static(b"hi")).unwrap();
        assert!(r.sent);
        assert!(r.finished);
    }
}
