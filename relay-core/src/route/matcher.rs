//! The `Router`: ties the per-method tries, the sharded LRU cache, and the
//! params pool into the single entry point the dispatcher calls on every
//! request.

use std::sync::Arc;

use crate::error::{RouteError, Result};
use crate::event::Params;
use crate::route::cache::{params_from_entry, CacheEntry, CacheStats, RouteCache};
use crate::route::pool::ParamsPool;
use crate::route::trie::{segments, Trie};
use crate::route::types::{HandlerVariant, Method, RouteMatch, METHOD_COUNT};

/// Owning handle to a [`RouteMatch`]. Dropping it returns the match's
/// `Params` map to the router's params pool.
pub struct MatchHandle {
    inner: Option<RouteMatch>,
    pool: Arc<ParamsPool>,
}

impl MatchHandle {
    pub fn get(&self) -> &RouteMatch {
        self.inner.as_ref().expect("MatchHandle used after release")
    }
}

impl std::ops::Deref for MatchHandle {
    type Target = RouteMatch;
    fn deref(&self) -> &RouteMatch {
        self.get()
    }
}

impl Drop for MatchHandle {
    fn drop(&mut self) {
        if let Some(m) = self.inner.take() {
            self.pool.release(m.params);
        }
    }
}

/// Per-method tries, a shared LRU cache, and a params pool.
///
/// Registration (`register_*`) is setup-only: callers are expected to finish pre-start
/// registration and implementations may disallow post-start mutation.
/// After setup the `Router` is wrapped in an `Arc` and shared read-only
/// across workers.
pub struct Router {
    tries: [Trie; METHOD_COUNT],
    cache: RouteCache,
    params_pool: Arc<ParamsPool>,
    max_path_depth: usize,
    max_params: usize,
}

impl Router {
    pub fn new(cache_capacity: usize, cache_shards: usize, max_path_depth: usize, max_params: usize) -> Self {
        Router {
            tries: Default::default(),
            cache: RouteCache::new(cache_capacity, cache_shards),
            params_pool: Arc::new(ParamsPool::new(64, max_params)),
            max_path_depth,
            max_params,
        }
    }

    pub fn register_regular(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn crate::route::RegularHandler>,
    ) -> Result<()> {
        self.register(method, pattern, HandlerVariant::Regular(handler))
    }

    pub fn register_stream(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn crate::route::StreamHandler>,
    ) -> Result<()> {
        self.register(method, pattern, HandlerVariant::Stream(handler))
    }

    pub fn register_stream_with_scheduler(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn crate::route::StreamSchedulerHandler>,
    ) -> Result<()> {
        self.register(method, pattern, HandlerVariant::StreamWithScheduler(handler))
    }

    /// Register `handler` under every method in the closed set.
    pub fn register_all(&mut self, pattern: &str, handler: HandlerVariant) -> Result<()> {
        for method in Method::ALL {
            self.register(method, pattern, handler.clone())?;
        }
        Ok(())
    }

    fn register(&mut self, method: Method, pattern: &str, handler: HandlerVariant) -> Result<()> {
        self.tries[method.index()].register(pattern, handler)?;
        self.cache.clear();
        Ok(())
    }

    /// Look up `(method, path)`, consulting the cache first.
    pub fn lookup(&self, method: Method, path: &str) -> Result<Option<MatchHandle>> {
        if let Some(entry) = self.cache.get(method, path) {
            let mut params = self.params_pool.acquire();
            let snapshot = params_from_entry(&entry);
            for (k, v) in snapshot.iter() {
                params.insert(k.to_string(), v.to_string());
            }
            return Ok(Some(MatchHandle {
                inner: Some(RouteMatch { handler: entry.handler, params, pattern: entry.pattern }),
                pool: self.params_pool.clone(),
            }));
        }

        let segs = segments(path);
        if segs.len() > self.max_path_depth {
            return Err(RouteError::TooDeep.into());
        }

        let mut raw_params = Vec::new();
        let found = self.tries[method.index()].lookup(&segs, &mut raw_params);
        let Some(trie_match) = found else { return Ok(None) };

        if raw_params.len() > self.max_params {
            return Err(RouteError::TooDeep.into());
        }

        self.cache.put(
            method,
            path,
            CacheEntry {
                handler: trie_match.handler.clone(),
                params: raw_params.clone(),
                pattern: trie_match.pattern.clone(),
            },
        );

        let mut params = self.params_pool.acquire();
        for (k, v) in raw_params {
            params.insert(k, v);
        }
        Ok(Some(MatchHandle {
            inner: Some(RouteMatch {
                handler: trie_match.handler.clone(),
                params,
                pattern: trie_match.pattern,
            }),
            pool: self.params_pool.clone(),
        }))
    }

    /// Build an independent copy of this router for exclusive use by one
    /// worker.
    ///
    /// The trie contents are deep-cloned (cheap: done once per worker at
    /// startup, over however many routes were registered) but the route
    /// cache and params pool are fresh, empty instances, not shared with
    /// `self` or any other worker's copy. That is what makes per-worker
    /// route lookups and cache evictions contention-free: each worker owns
    /// its own cache and pool outright rather than taking a lock shared
    /// with every other worker.
    pub fn fork_worker_local(&self, cache_capacity: usize, cache_shards: usize) -> Router {
        Router {
            tries: self.tries.clone(),
            cache: RouteCache::new(cache_capacity, cache_shards),
            params_pool: Arc::new(ParamsPool::new(64, self.max_params)),
            max_path_depth: self.max_path_depth,
            max_params: self.max_params,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Release a borrowed `Params` map directly, for callers (the
    /// dispatcher) that copy fields out of a `MatchHandle` and want to
    /// return its params early rather than waiting on `Drop`.
    pub fn release_params(&self, params: Params) {
        self.params_pool.release(params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as RResult;
    use crate::event::Event;

    fn noop() -> Arc<dyn crate::route::RegularHandler> {
        Arc::new(|e: Event| async move { RResult::Ok(e) })
    }

    #[test]
    fn lookup_miss_returns_none() {
        let router = Router::new(16, 2, 32, 16);
        assert!(router.lookup(Method::Get, "/nope").unwrap().is_none());
    }

    #[test]
    fn registration_then_lookup_round_trips_params() {
        let mut router = Router::new(16, 2, 32, 16);
        router.register_regular(Method::Get, "/users/:id", noop()).unwrap();
        let m = router.lookup(Method::Get, "/users/7").unwrap().unwrap();
        assert_eq!(m.params.get("id"), Some("7"));
        assert_eq!(&*m.pattern, "/users/:id");
    }

    #[test]
    fn cache_hit_produces_same_params_as_trie_walk() {
        let mut router = Router::new(16, 2, 32, 16);
        router.register_regular(Method::Get, "/users/:id", noop()).unwrap();
        let first = router.lookup(Method::Get, "/users/7").unwrap().unwrap();
        assert_eq!(first.params.get("id"), Some("7"));
        drop(first);
        let second = router.lookup(Method::Get, "/users/7").unwrap().unwrap();
        assert_eq!(second.params.get("id"), Some("7"));
        assert!(router.cache_stats().hits >= 1);
    }

    #[test]
    fn registration_invalidates_cache() {
        let mut router = Router::new(16, 2, 32, 16);
        router.register_regular(Method::Get, "/a", noop()).unwrap();
        router.lookup(Method::Get, "/a").unwrap();
        router.register_regular(Method::Get, "/b", noop()).unwrap();
        // Cache was cleared by the second registration, so this lookup is
        // necessarily a trie walk (miss), not a stale cache hit.
        let misses_before = router.cache_stats().misses;
        router.lookup(Method::Get, "/a").unwrap();
        assert!(router.cache_stats().misses > misses_before);
    }

    #[test]
    fn forked_router_has_independent_cache_but_shares_registered_routes() {
        let mut router = Router::new(16, 2, 32, 16);
        router.register_regular(Method::Get, "/users/:id", noop()).unwrap();

        let fork_a = router.fork_worker_local(16, 2);
        let fork_b = router.fork_worker_local(16, 2);

        // Both forks can resolve the route registered before forking...
        assert_eq!(fork_a.lookup(Method::Get, "/users/7").unwrap().unwrap().params.get("id"), Some("7"));
        assert_eq!(fork_b.lookup(Method::Get, "/users/9").unwrap().unwrap().params.get("id"), Some("9"));

        // ...but a cache hit recorded on one fork is invisible to the other.
        fork_a.lookup(Method::Get, "/users/7").unwrap();
        assert!(fork_a.cache_stats().hits >= 1);
        assert_eq!(fork_b.cache_stats().hits, 0);
    }

    #[test]
    fn too_deep_path_is_rejected() {
        let mut router = Router::new(16, 2, 2, 16);
        router.register_regular(Method::Get, "/a/b/c", noop()).unwrap();
        let err = router.lookup(Method::Get, "/a/b/c").unwrap_err();
        assert!(matches!(err, crate::error::RelayError::Route(RouteError::TooDeep)));
    }
}
