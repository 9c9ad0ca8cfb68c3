//! Server options and the pool-sizing strategy enum (C8).
//!
//! `ServerOptions` is a plain struct rather than a hot-reloadable config
//! enum: CLI/config loading is an external collaborator here, so
//! the core only needs a typed bag of defaults that the embedding binary
//! can populate however it likes (env vars, a config file, flags — not this
//! crate's concern).

/// Pool warmup/eviction policy (C8). Drives how many `Event`s and params
/// maps are pre-allocated at startup, and feeds the "efficiency health"
/// threshold reported by the memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStrategy {
    /// Warm up a quarter of `event_pool_size`. Lowest idle memory.
    Minimal,
    /// Warm up half of `event_pool_size`. Default trade-off.
    #[default]
    Balanced,
    /// Warm up the entire pool at startup. Highest idle memory, no
    /// allocation stalls under burst load.
    Performance,
}

impl AllocationStrategy {
    /// Number of entries to pre-allocate given a pool capacity.
    pub fn warmup_count(self, capacity: usize) -> usize {
        match self {
            AllocationStrategy::Minimal => capacity / 4,
            AllocationStrategy::Balanced => capacity / 2,
            AllocationStrategy::Performance => capacity,
        }
    }
}

/// Selects whether each worker's route cache and event pool are isolated
/// to that worker or shared across all of them behind a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerModel {
    /// One OS thread per worker, each running its own single-threaded
    /// cooperative event loop with its own route cache and event pool and
    /// its own listening socket. A connection is handled entirely on the
    /// thread that accepted it, so no request-path state is ever touched
    /// from more than one thread. The default, and the only model this
    /// crate recommends.
    #[default]
    PerWorker,
    /// Every worker shares one route cache and one event pool behind a
    /// lock. Every cache lookup and every pool acquire/release then
    /// crosses threads, which is exactly the contention per-worker pools
    /// exist to avoid. Kept only for embedders who specifically need a
    /// single pool sized across the whole process; not recommended.
    SharedGlobal,
}

/// Startup options for a [`crate::connection::Server`].
///
/// All fields have documented defaults; construct with
/// `ServerOptions::default()` and override only what you need.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    pub max_body_bytes: usize,
    pub request_timeout_ms: u64,
    pub keepalive_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub sse_keepalive_ms: u64,
    pub sse_watermark_bytes: usize,
    /// `None` means "use `num_cpus::get()`".
    pub worker_count: Option<usize>,
    pub event_pool_size: usize,
    pub route_cache_size: usize,
    pub allocation_strategy: AllocationStrategy,
    /// Max path-parameter-map entries per request.
    pub max_params: usize,
    /// Max path depth a route lookup will walk before failing `TooDeep`.
    pub max_path_depth: usize,
    /// Number of shards in the route LRU cache.
    pub route_cache_shards: usize,
    /// Linger timeout for a draining connection.
    pub linger_timeout_ms: u64,
    /// Whether worker state (route cache, event pool) is per-worker or
    /// shared globally behind a lock.
    pub worker_model: WorkerModel,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            host: "127.0.0.1".to_string(),
            port: 3000,
            backlog: 128,
            max_body_bytes: 1024 * 1024,
            request_timeout_ms: 30_000,
            keepalive_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            sse_keepalive_ms: 30_000,
            sse_watermark_bytes: 64 * 1024,
            worker_count: None,
            event_pool_size: 200,
            route_cache_size: 1000,
            allocation_strategy: AllocationStrategy::Balanced,
            max_params: 16,
            max_path_depth: 32,
            route_cache_shards: 16,
            linger_timeout_ms: 5_000,
            worker_model: WorkerModel::PerWorker,
        }
    }
}

impl ServerOptions {
    /// Resolve `worker_count`, falling back to the number of logical CPUs
    /// when unset.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = ServerOptions::default();
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.port, 3000);
        assert_eq!(opts.backlog, 128);
        assert_eq!(opts.max_body_bytes, 1024 * 1024);
        assert_eq!(opts.event_pool_size, 200);
        assert_eq!(opts.route_cache_size, 1000);
        assert_eq!(opts.sse_watermark_bytes, 64 * 1024);
        assert_eq!(opts.keepalive_timeout_ms, 30_000);
    }

    #[test]
    fn warmup_counts_follow_strategy() {
        assert_eq!(AllocationStrategy::Minimal.warmup_count(200), 50);
        assert_eq!(AllocationStrategy::Balanced.warmup_count(200), 100);
        assert_eq!(AllocationStrategy::Performance.warmup_count(200), 200);
    }
}
