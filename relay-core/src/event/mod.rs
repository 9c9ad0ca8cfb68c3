//! Per-request context: request view, response builder, owned key/value
//! maps, and SSE state, plus the bounded pool that recycles
//! them.

mod context;
mod headers;
mod params;
mod pool;
mod request;
mod response;

pub use context::Event;
pub use headers::Headers;
pub use params::{Params, Query, UserContext};
pub use pool::{EventPool, PoolStats};
pub use request::{HttpVersion, Request};
pub use response::{Body, Response};
