//! Context pool, tiered by expected parameter count.
//!
//! Size-tiered to amortize allocation: small (≤4 params), medium (5-8),
//! large (>8, overflow map pre-allocated). `get`/`put` route to the
//! narrowest tier that fits; gets/puts/hits are tracked per tier so a
//! sustained low hit rate can be read as "contexts retained past request
//! lifetime" (a caller bug, not a pool bug).

use crate::context::{Context, CancellationHandle, INLINE_PARAM_CAPACITY};
use crate::middleware::HandlerChain;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const SMALL_MAX_PARAMS: usize = 4;
const LARGE_OVERFLOW_CAPACITY: usize = 8;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Tier {
    Small,
    Medium,
    Large,
}

fn classify(expected_param_count: usize) -> Tier {
    if expected_param_count <= SMALL_MAX_PARAMS {
        Tier::Small
    } else if expected_param_count <= INLINE_PARAM_CAPACITY {
        Tier::Medium
    } else {
        Tier::Large
    }
}

#[derive(Default)]
struct TierCounters {
    gets: AtomicU64,
    puts: AtomicU64,
    hits: AtomicU64,
}

impl TierCounters {
    fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.gets.load(Ordering::Relaxed),
            self.puts.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
        )
    }
}

/// A `(gets, puts, hits)` reading per tier. Not required to be strictly
/// consistent across fields — a plain `Relaxed` load suffices.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PoolStats {
    pub small: (u64, u64, u64),
    pub medium: (u64, u64, u64),
    pub large: (u64, u64, u64),
}

pub struct ContextPool {
    small: Mutex<Vec<Context>>,
    medium: Mutex<Vec<Context>>,
    large: Mutex<Vec<Context>>,
    check_cancellation: bool,
    counters_small: TierCounters,
    counters_medium: TierCounters,
    counters_large: TierCounters,
}

impl ContextPool {
    pub fn new(check_cancellation: bool) -> Self {
        Self {
            small: Mutex::new(Vec::new()),
            medium: Mutex::new(Vec::new()),
            large: Mutex::new(Vec::new()),
            check_cancellation,
            counters_small: TierCounters::default(),
            counters_medium: TierCounters::default(),
            counters_large: TierCounters::default(),
        }
    }

    fn slot(&self, tier: Tier) -> (&Mutex<Vec<Context>>, &TierCounters) {
        match tier {
            Tier::Small => (&self.small, &self.counters_small),
            Tier::Medium => (&self.medium, &self.counters_medium),
            Tier::Large => (&self.large, &self.counters_large),
        }
    }

    /// Take a context sized for `expected_param_count` parameters, either
    /// reused from the matching tier or freshly built.
    pub fn get(&self, expected_param_count: usize) -> Context {
        let tier = classify(expected_param_count);
        let (pool, counters) = self.slot(tier);
        counters.gets.fetch_add(1, Ordering::Relaxed);

        let mut guard = pool.lock().expect("pool lock poisoned");
        if let Some(ctx) = guard.pop() {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            return ctx;
        }
        drop(guard);

        let empty: HandlerChain = Arc::from(Vec::new().into_boxed_slice());
        let ctx = Context::standalone(empty, self.check_cancellation);
        match tier {
            Tier::Large => ctx.with_overflow_capacity(LARGE_OVERFLOW_CAPACITY),
            _ => ctx,
        }
    }

    /// Return a context to the tier matching its current parameter count,
    /// after resetting it. Never allocates.
    pub fn put(&self, mut ctx: Context) {
        let tier = classify(ctx.param_count());
        ctx.reset();
        let (pool, counters) = self.slot(tier);
        counters.puts.fetch_add(1, Ordering::Relaxed);
        pool.lock().expect("pool lock poisoned").push(ctx);
    }

    pub fn attach(&self, ctx: &mut Context, request: crate::request::Request, handlers: HandlerChain, cancellation: Option<CancellationHandle>) {
        ctx.attach(request, handlers, cancellation);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            small: self.counters_small.snapshot(),
            medium: self.counters_medium.snapshot(),
            large: self.counters_large.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_context_increments_hit_counter() {
        let pool = ContextPool::new(false);
        let ctx = pool.get(2);
        pool.put(ctx);
        let _reused = pool.get(2);
        assert_eq!(pool.stats().small, (2, 1, 1));
    }

    #[test]
    fn tier_selection_by_expected_param_count() {
        let pool = ContextPool::new(false);
        let _ = pool.get(2);
        let _ = pool.get(6);
        let _ = pool.get(9);
        let stats = pool.stats();
        assert_eq!(stats.small.0, 1);
        assert_eq!(stats.medium.0, 1);
        assert_eq!(stats.large.0, 1);
    }

    #[test]
    fn put_routes_by_actual_param_count_not_request_tier() {
        let pool = ContextPool::new(false);
        let mut ctx = pool.get(1);
        ctx.push_param("a", "1");
        ctx.push_param("b", "2");
        ctx.push_param("c", "3");
        ctx.push_param("d", "4");
        ctx.push_param("e", "5");
        pool.put(ctx);
        assert_eq!(pool.stats().medium.1, 1);
    }
}
