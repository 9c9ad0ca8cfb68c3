//! Central owner of the event pool and params pool, plus the
//! warmup/eviction strategy and "efficiency health" reporting.

use crate::config::{AllocationStrategy, ServerOptions};
use crate::event::{EventPool, PoolStats};

/// Pool-hit ratio below which [`MemoryManager::is_healthy`] reports
/// unhealthy. Not configurable via [`ServerOptions`] today — an
/// implementation detail of the memory manager, not a startup option.
const HEALTH_THRESHOLD: f64 = 0.8;

/// Aggregate statistics exposed by the memory manager.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub events: PoolStats,
    pub strategy: AllocationStrategy,
}

/// Owns the [`EventPool`] (C3) and drives its warmup policy from an
/// [`AllocationStrategy`].
///
/// The route matcher's params pool is owned by the `Router`
/// directly rather than here, since it is scoped to route lookups and has
/// no use outside that component; this manager's remit is the event pool
/// plus the pool-sizing strategy that also seeds the params pool's
/// capacity hint at `Router` construction time.
pub struct MemoryManager {
    events: EventPool,
    strategy: AllocationStrategy,
}

impl MemoryManager {
    pub fn new(opts: &ServerOptions) -> Self {
        MemoryManager {
            events: EventPool::new(opts.event_pool_size, opts.allocation_strategy),
            strategy: opts.allocation_strategy,
        }
    }

    pub fn events(&self) -> &EventPool {
        &self.events
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats { events: self.events.stats(), strategy: self.strategy }
    }

    /// No-op hook reserved for future shrink logic: logs
    /// current stats at debug level and returns.
    pub fn optimize(&self) {
        let stats = self.stats();
        log::debug!(
            "memory manager optimize(): pool hit ratio {:.2}, current_usage={}, peak_usage={}",
            stats.events.hit_ratio(),
            stats.events.current_usage,
            stats.events.peak_usage,
        );
    }

    /// `true` when the event pool's hit ratio is at or above the
    /// efficiency health threshold.
    pub fn is_healthy(&self) -> bool {
        self.stats().events.hit_ratio() >= HEALTH_THRESHOLD
    }

    /// Textual report used by tests and operator-facing diagnostics.
    pub fn report(&self) -> String {
        let stats = self.stats();
        format!(
            "strategy={:?} created={} reused={} hits={} misses={} hit_ratio={:.2} current_usage={} peak_usage={} healthy={}",
            stats.strategy,
            stats.events.created,
            stats.events.reused,
            stats.events.pool_hits,
            stats.events.pool_misses,
            stats.events.hit_ratio(),
            stats.events.current_usage,
            stats.events.peak_usage,
            self.is_healthy(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_contains_strategy_and_hit_ratio() {
        let opts = ServerOptions::default();
        let manager = MemoryManager::new(&opts);
        let event = manager.events().acquire();
        manager.events().release(event);
        let report = manager.report();
        assert!(report.contains("strategy="));
        assert!(report.contains("hit_ratio="));
    }

    #[test]
    fn fresh_pool_with_full_warmup_is_healthy() {
        let mut opts = ServerOptions::default();
        opts.event_pool_size = 8;
        opts.allocation_strategy = AllocationStrategy::Performance;
        let manager = MemoryManager::new(&opts);
        for _ in 0..8 {
            let event = manager.events().acquire();
            manager.events().release(event);
        }
        assert!(manager.is_healthy());
    }
}
