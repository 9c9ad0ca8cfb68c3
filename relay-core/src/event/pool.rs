//! Bounded free-list of reusable [`Event`]s.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::AllocationStrategy;
use crate::event::Event;

/// Point-in-time counters for an [`EventPool`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub created: usize,
    pub reused: usize,
    pub pool_hits: usize,
    pub pool_misses: usize,
    pub current_usage: usize,
    pub peak_usage: usize,
}

impl PoolStats {
    /// Fraction of `acquire()` calls served from the free list rather than
    /// freshly allocated. Used by the memory manager's "efficiency health"
    /// threshold.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.pool_hits + self.pool_misses;
        if total == 0 {
            1.0
        } else {
            self.pool_hits as f64 / total as f64
        }
    }
}

/// Bounded free list of reset `Event`s, with warmup and statistics. `acquire`/`release` form the pool contract: an `Event` is owned
/// exclusively by whoever holds it between those two calls.
pub struct EventPool {
    free: Mutex<Vec<Box<Event>>>,
    max_size: usize,
    created: AtomicUsize,
    reused: AtomicUsize,
    pool_hits: AtomicUsize,
    pool_misses: AtomicUsize,
    current_usage: AtomicUsize,
    peak_usage: AtomicUsize,
}

impl EventPool {
    /// Build a pool with the given max size, pre-allocating
    /// `strategy.warmup_count(max_size)` entries up front.
    pub fn new(max_size: usize, strategy: AllocationStrategy) -> Self {
        let warmup = strategy.warmup_count(max_size).min(max_size);
        let mut free = Vec::with_capacity(max_size);
        for _ in 0..warmup {
            free.push(Box::new(Event::new()));
        }
        EventPool {
            free: Mutex::new(free),
            max_size,
            created: AtomicUsize::new(warmup),
            reused: AtomicUsize::new(0),
            pool_hits: AtomicUsize::new(0),
            pool_misses: AtomicUsize::new(0),
            current_usage: AtomicUsize::new(0),
            peak_usage: AtomicUsize::new(0),
        }
    }

    /// Acquire a reset `Event`, reusing one from the free list if available,
    /// otherwise allocating a fresh one.
    pub fn acquire(&self) -> Box<Event> {
        let mut free = self.free.lock().expect("event pool mutex poisoned");
        let event = if let Some(mut e) = free.pop() {
            self.pool_hits.fetch_add(1, Ordering::Relaxed);
            self.reused.fetch_add(1, Ordering::Relaxed);
            e.reset();
            e
        } else {
            self.pool_misses.fetch_add(1, Ordering::Relaxed);
            self.created.fetch_add(1, Ordering::Relaxed);
            Box::new(Event::new())
        };
        drop(free);
        let usage = self.current_usage.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_usage.fetch_max(usage, Ordering::Relaxed);
        event
    }

    /// Reset and return an `Event` to the pool; if the pool is already at
    /// `max_size`, the `Event` is dropped instead of retained.
    pub fn release(&self, mut event: Box<Event>) {
        event.reset();
        self.current_usage.fetch_sub(1, Ordering::Relaxed);
        let mut free = self.free.lock().expect("event pool mutex poisoned");
        if free.len() < self.max_size {
            free.push(event);
        }
        // else: drop `event`, returning its heap allocations to the
        // allocator rather than growing the free list past max_size.
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            pool_hits: self.pool_hits.load(Ordering::Relaxed),
            pool_misses: self.pool_misses.load(Ordering::Relaxed),
            current_usage: self.current_usage.load(Ordering::Relaxed),
            peak_usage: self.peak_usage.load(Ordering::Relaxed),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_resets_fully() {
        let pool = EventPool::new(4, AllocationStrategy::Minimal);
        let mut event = pool.acquire();
        event.params.insert("id", "42");
        event.send_text("hi").unwrap();
        pool.release(event);

        let reacquired = pool.acquire();
        assert_eq!(reacquired.response.status, http::StatusCode::OK);
        assert!(reacquired.response.headers.is_empty());
        assert!(reacquired.response.body.is_none());
        assert!(!reacquired.response_sent());
        assert!(!reacquired.is_finished());
        assert!(!reacquired.sse_started());
        assert!(reacquired.params.is_empty());
        assert!(reacquired.query.is_empty());
    }

    #[test]
    fn warmup_counts_follow_strategy() {
        let pool = EventPool::new(200, AllocationStrategy::Performance);
        assert_eq!(pool.stats().created, 200);
    }

    #[test]
    fn release_beyond_capacity_is_dropped_not_retained() {
        let pool = EventPool::new(1, AllocationStrategy::Minimal);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        // Only one slot fits; current_usage should settle back to 0 either way.
        assert_eq!(pool.stats().current_usage, 0);
    }

    #[test]
    fn peak_usage_tracks_concurrent_high_water_mark() {
        let pool = EventPool::new(4, AllocationStrategy::Minimal);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.stats().peak_usage, 2);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.stats().peak_usage, 2);
    }
}
