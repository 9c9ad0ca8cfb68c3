//! Route matcher: per-method trie + sharded LRU cache + params pool.

mod cache;
mod matcher;
mod pool;
mod trie;
mod types;

pub use cache::CacheStats;
pub use matcher::{MatchHandle, Router};
pub use pool::ParamsPool;
pub use types::{
    BoxFuture, HandlerVariant, Method, RegularHandler, RouteMatch, Segment, StreamHandler,
    StreamSchedulerHandler, UnsupportedMethod, METHOD_COUNT,
};
