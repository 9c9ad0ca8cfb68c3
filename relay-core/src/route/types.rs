//! Closed method enumeration and route/handler types.
//!
//! Handlers and middleware own their `Event`/`SseWriter` by value and hand
//! it back wrapped in the result, rather than borrowing it across await
//! points. That keeps every future here `'static` and lets a plain
//! `async fn`/closure implement these traits via the blanket impls below —
//! no explicit trait object boilerplate required at registration call
//! sites.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Result;
use crate::event::Event;
use crate::sse::{SchedulerHandle, SseWriter};

/// Number of variants in [`Method`]; used to size the per-method trie array.
pub const METHOD_COUNT: usize = 7;

/// The closed set of supported HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; METHOD_COUNT] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Head,
        Method::Options,
    ];

    /// Dense index for array-indexed dispatch, avoiding a hash lookup on
    /// the request-handling hot path.
    pub fn index(self) -> usize {
        match self {
            Method::Get => 0,
            Method::Post => 1,
            Method::Put => 2,
            Method::Delete => 3,
            Method::Patch => 4,
            Method::Head => 5,
            Method::Options => 6,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

/// Error returned by [`Method::from_str`] for a method outside the closed
/// set this crate supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedMethod;

impl fmt::Display for UnsupportedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unsupported HTTP method")
    }
}
impl std::error::Error for UnsupportedMethod {}

impl FromStr for Method {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(UnsupportedMethod),
        }
    }
}

/// A boxed, pinned, `'static` future — every handler/middleware future ends
/// up here since `Event`/`SseWriter` are owned by value, not borrowed.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A regular (buffered-response) request handler.
pub trait RegularHandler: Send + Sync {
    fn call(&self, event: Event) -> BoxFuture<Result<Event>>;
}

impl<F, Fut> RegularHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Event>> + Send + 'static,
{
    fn call(&self, event: Event) -> BoxFuture<Result<Event>> {
        Box::pin((self)(event))
    }
}

/// A streaming (SSE) handler invoked after the connection has transitioned
/// to `Streaming` state.
pub trait StreamHandler: Send + Sync {
    fn call(&self, writer: SseWriter) -> BoxFuture<Result<()>>;
}

impl<F, Fut> StreamHandler for F
where
    F: Fn(SseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, writer: SseWriter) -> BoxFuture<Result<()>> {
        Box::pin((self)(writer))
    }
}

/// A streaming handler that additionally receives a [`SchedulerHandle`] for
/// registering timer-driven callbacks.
pub trait StreamSchedulerHandler: Send + Sync {
    fn call(&self, writer: SseWriter, scheduler: SchedulerHandle) -> BoxFuture<Result<()>>;
}

impl<F, Fut> StreamSchedulerHandler for F
where
    F: Fn(SseWriter, SchedulerHandle) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, writer: SseWriter, scheduler: SchedulerHandle) -> BoxFuture<Result<()>> {
        Box::pin((self)(writer, scheduler))
    }
}

/// Tagged union of the three handler shapes a route can carry. Registration is explicit (`register_regular`,
/// `register_stream`, `register_stream_with_scheduler`) rather than
/// detected via generics/overload reflection.
#[derive(Clone)]
pub enum HandlerVariant {
    Regular(Arc<dyn RegularHandler>),
    Stream(Arc<dyn StreamHandler>),
    StreamWithScheduler(Arc<dyn StreamSchedulerHandler>),
}

impl fmt::Debug for HandlerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            HandlerVariant::Regular(_) => "Regular",
            HandlerVariant::Stream(_) => "Stream",
            HandlerVariant::StreamWithScheduler(_) => "StreamWithScheduler",
        };
        write!(f, "HandlerVariant::{kind}")
    }
}

/// One segment of a registered route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Param(String),
    Wildcard,
}

/// A successful route lookup: the resolved handler, extracted params, and
/// the original pattern string (kept for diagnostics and LRU round-trips).
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: HandlerVariant,
    pub params: crate::event::Params,
    pub pattern: Arc<str>,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("handler", &self.handler)
            .field("params", &self.params)
            .field("pattern", &self.pattern)
            .finish()
    }
}
