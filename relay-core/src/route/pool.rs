//! Bounded free-list of [`Params`] maps used only during route lookup.
//!
//! This is distinct from the [`crate::event::EventPool`] (C3): a route
//! lookup needs a scratch `Params` to collect captures into before the
//! dispatcher copies them into the request's `Event`, and allocating one
//! per lookup would defeat the matcher's allocation-bounded hot path.

use std::sync::Mutex;

use crate::event::Params;

/// Bounded free list of reusable [`Params`] maps.
///
/// `acquire`/`release` mirror the [`crate::event::EventPool`] contract: the
/// caller that receives a [`crate::route::RouteMatch`] via
/// [`crate::route::MatchHandle`] MUST release it so the underlying `Params`
/// returns to this pool.
pub struct ParamsPool {
    free: Mutex<Vec<Params>>,
    max_size: usize,
    capacity_hint: usize,
}

impl ParamsPool {
    pub fn new(max_size: usize, capacity_hint: usize) -> Self {
        ParamsPool {
            free: Mutex::new(Vec::with_capacity(max_size)),
            max_size,
            capacity_hint,
        }
    }

    pub fn acquire(&self) -> Params {
        let mut free = self.free.lock().expect("params pool mutex poisoned");
        free.pop().unwrap_or_else(|| Params::with_capacity(self.capacity_hint))
    }

    pub fn release(&self, mut params: Params) {
        params.reset();
        let mut free = self.free.lock().expect("params pool mutex poisoned");
        if free.len() < self.max_size {
            free.push(params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_params_are_reset_on_release() {
        let pool = ParamsPool::new(2, 4);
        let mut p = pool.acquire();
        p.insert("id", "1");
        pool.release(p);
        let reacquired = pool.acquire();
        assert!(reacquired.is_empty());
    }

    #[test]
    fn release_beyond_capacity_is_dropped() {
        let pool = ParamsPool::new(1, 4);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        // Both releases succeed without panicking; pool caps silently.
    }
}
