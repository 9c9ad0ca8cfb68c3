//! Middleware chain with re-entrant continuation semantics, plus the
//! fixed-capacity "Fast" pre-only variant.

mod chain;
mod fast;

pub use chain::{Chain, Middleware, Next};
pub use fast::{FastChain, FastMiddleware, DEFAULT_FAST_CAPACITY};
