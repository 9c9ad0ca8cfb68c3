//! Error taxonomy for the dispatch core.
//!
//! Every fallible operation in this crate returns [`RelayError`]. The
//! variants map onto error *kinds* (transport, protocol, route, handler,
//! resource, state) rather than onto individual
//! failure sites, so a caller can match on *kind* without caring which
//! component raised it.

use http::StatusCode;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Kinds of failure the dispatch core can surface.
///
/// See the crate-level design notes for the propagation rules: middleware
/// and handler errors bubble to the dispatcher, which either calls a
/// configured `on_error` hook or maps the error to a status code and writes
/// a terse body.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Accept/read/write failure, peer close, or I/O timeout.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed request line, headers, or body framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Route registration or lookup failure.
    #[error("route error: {0}")]
    Route(#[from] RouteError),

    /// Error returned by a user handler or middleware.
    #[error("handler error: {0}")]
    Handler(String),

    /// Pool exhaustion or write back-pressure.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Programming error: invalid state transition.
    #[error("state error: {0}")]
    State(String),
}

/// Failures raised by the route matcher (C1).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Two registrations disagree on the parameter name at the same trie
    /// node position (e.g. `/users/:id` then `/users/:user_id`).
    #[error("conflicting parameter name at this path position")]
    PatternConflict,
    /// The params pool and fallback allocation both failed.
    #[error("params pool exhausted")]
    PoolExhausted,
    /// Path exceeds the configured max depth or max param count.
    #[error("path exceeds configured depth/param limits")]
    TooDeep,
}

/// Failures raised by the event pool, params pool, or SSE writer
/// back-pressure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("pool exhausted")]
    PoolExhausted,
    #[error("write queue over watermark")]
    Backpressure,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("event data contains a lone CR or NUL byte")]
    InvalidEventData,
}

impl RelayError {
    /// Map this error to the status code the dispatcher should write when
    /// no `on_error` hook is configured.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Protocol(_) => StatusCode::BAD_REQUEST,
            RelayError::Route(RouteError::TooDeep) => StatusCode::BAD_REQUEST,
            RelayError::Route(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Resource(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Terse body written alongside `status()` when no `on_error` hook
    /// handles the error.
    pub fn default_body(&self) -> &'static str {
        match self {
            RelayError::Protocol(_) => "Bad Request",
            RelayError::Route(RouteError::TooDeep) => "Bad Request",
            RelayError::Resource(_) => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_error_taxonomy() {
        assert_eq!(
            RelayError::Protocol("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Route(RouteError::TooDeep).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Handler("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::Resource(ResourceError::PoolExhausted).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
