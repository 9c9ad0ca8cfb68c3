//! # relay-core
//!
//! Embeddable HTTP/1.1 request-dispatch engine: a multi-tier route matcher
//! with parameter extraction, a pooled per-request event context, a
//! re-entrant middleware chain, and an async connection state machine that
//! switches between buffered-response and Server-Sent Events streaming
//! modes.
//!
//! ## Architecture
//!
//! - [`route`]: per-method trie + sharded LRU cache + params pool (C1).
//! - [`event`]: the per-request `Event` aggregate and its bounded pool (C2, C3).
//! - [`middleware`]: the re-entrant `next()` chain and the pre-only "Fast" variant (C4).
//! - [`dispatcher`]: orchestrates one request through hooks, routing, and middleware (C5).
//! - [`connection`]: the accept/read/write state machine and embeddable `Server` (C6).
//! - [`sse`]: framed Server-Sent Events emission with back-pressure (C7).
//! - [`memory`]: owns the event pool and its warmup/eviction strategy (C8).
//!
//! Byte-level HTTP/1.1 parsing lives in an internal `httpwire` module only
//! because something has to produce the [`event::Request`] record this
//! crate consumes; it is intentionally narrow and not part of the public
//! dispatch-core surface.
//!
//! ## Example
//!
//! ```no_run
//! use relay_core::{config::ServerOptions, connection::Server, error::Result, event::Event, route::Method};
//!
//! async fn hello(mut event: Event) -> Result<Event> {
//!     event.send_text("Hello")?;
//!     Ok(event)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut server = Server::new(ServerOptions::default());
//!     server.route(Method::Get, "/", std::sync::Arc::new(hello))?;
//!     server.serve().await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod event;
mod httpwire;
pub mod memory;
pub mod middleware;
pub mod route;
pub mod sse;

pub use error::{RelayError, Result};
