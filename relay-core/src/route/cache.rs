//! Sharded LRU cache of `(method, exact path)` -> match snapshot.
//!
//! Sharded by a hash of the key to cut lock contention across worker
//! threads. Each shard is an independent `lru::LruCache` behind an
//! `RwLock`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use lru::LruCache;

use crate::event::Params;
use crate::route::types::{HandlerVariant, Method};

/// A cached match, keyed by `(method, exact path)`.
#[derive(Clone)]
pub struct CacheEntry {
    pub handler: HandlerVariant,
    pub params: Vec<(String, String)>,
    pub pattern: Arc<str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type CacheKey = (Method, String);

struct Shard {
    lru: RwLock<LruCache<CacheKey, CacheEntry>>,
}

/// Bounded, move-to-front, sharded `(method, path)` -> match cache.
/// Any route registration invalidates the entire cache.
pub struct RouteCache {
    shards: Vec<Shard>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
}

impl RouteCache {
    pub fn new(total_capacity: usize, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = (total_capacity / shard_count).max(1);
        let cap = NonZeroUsize::new(per_shard).unwrap();
        let shards = (0..shard_count)
            .map(|_| Shard { lru: RwLock::new(LruCache::new(cap)) })
            .collect();
        RouteCache {
            shards,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            evictions: AtomicUsize::new(0),
        }
    }

    fn shard_for(&self, key: &CacheKey) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Move-to-front on hit.
    pub fn get(&self, method: Method, path: &str) -> Option<CacheEntry> {
        let key = (method, path.to_string());
        let shard = self.shard_for(&key);
        let mut lru = shard.lru.write().expect("route cache shard poisoned");
        let hit = lru.get(&key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Insert a fresh match; evicts the shard's tail on overflow.
    pub fn put(&self, method: Method, path: &str, entry: CacheEntry) {
        let key = (method, path.to_string());
        let shard = self.shard_for(&key);
        let mut lru = shard.lru.write().expect("route cache shard poisoned");
        let was_full = lru.len() >= lru.cap().get() && !lru.contains(&key);
        lru.put(key, entry);
        if was_full {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Flush every shard.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lru.write().expect("route cache shard poisoned").clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn params_from_entry(entry: &CacheEntry) -> Params {
    let mut params = Params::with_capacity(entry.params.len());
    for (k, v) in &entry.params {
        params.insert(k.clone(), v.clone());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as RResult;
    use crate::event::Event;
    use std::sync::Arc as StdArc;

    fn entry() -> CacheEntry {
        CacheEntry {
            handler: HandlerVariant::Regular(StdArc::new(|e: Event| async move { RResult::Ok(e) })),
            params: vec![],
            pattern: Arc::from("/x"),
        }
    }

    #[test]
    fn eviction_after_capacity_plus_one_distinct_lookups() {
        let cache = RouteCache::new(4, 1);
        for i in 0..4 {
            cache.put(Method::Get, &format!("/p{i}"), entry());
        }
        cache.put(Method::Get, "/p4", entry());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
    }

    /// `eviction_after_capacity_plus_one_distinct_lookups` above pins
    /// `shard_count` to 1 to make "capacity+1 distinct lookups -> exactly 1
    /// eviction" exact. At the real shipped default (16 shards) that exact
    /// count depends on how keys happen to hash across shards, so this test
    /// instead inserts far more distinct keys than the real default
    /// capacity and only asserts evictions happened at all — true
    /// regardless of hash distribution as long as the batch comfortably
    /// exceeds total capacity.
    #[test]
    fn eviction_occurs_under_real_default_shard_count() {
        let defaults = crate::config::ServerOptions::default();
        let cache = RouteCache::new(defaults.route_cache_size, defaults.route_cache_shards);
        for i in 0..(defaults.route_cache_size * 10) {
            cache.put(Method::Get, &format!("/p{i}"), entry());
        }
        assert!(cache.stats().evictions >= 1);
    }

    #[test]
    fn clear_flushes_every_shard() {
        let cache = RouteCache::new(8, 4);
        cache.put(Method::Get, "/a", entry());
        assert!(cache.get(Method::Get, "/a").is_some());
        cache.clear();
        // get() after clear still counts as a lookup but should miss.
        let stats_before = cache.stats().misses;
        assert!(cache.get(Method::Get, "/a").is_none());
        assert_eq!(cache.stats().misses, stats_before + 1);
    }
}
