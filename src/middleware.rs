//! Middleware chain executor.
//!
//! The executor itself is a handful of lines living on [`crate::context::Context`]
//! (`next`/`abort`); this module defines the `Handler` contract those lines
//! invoke and the composition helper the route registration API uses to
//! splice global, group, and route-level middleware into one ordered slice.

use crate::context::Context;
use std::sync::Arc;

/// One link in a request's handler chain.
///
/// A handler that never calls `ctx.next()` simply ends the chain at that
/// point — this mirrors ordinary middleware frameworks where "not
/// calling next" means "don't continue down the chain", not an error.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: &mut Context);
}

impl<F> Handler for F
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn call(&self, ctx: &mut Context) {
        self(ctx)
    }
}

/// A shared, ordered handler chain. `Arc<[..]>` rather than `Vec` because
/// the same chain is installed into many pooled contexts over the router's
/// lifetime and must never be mutated after registration.
pub type HandlerChain = Arc<[Arc<dyn Handler>]>;

/// Splice several middleware groups and the terminal route handlers into one
/// chain, in composition order (global → group → route).
pub fn compose(groups: Vec<&[Arc<dyn Handler>]>) -> HandlerChain {
    let total: usize = groups.iter().map(|g| g.len()).sum();
    let mut flat = Vec::with_capacity(total);
    for g in groups {
        flat.extend(g.iter().cloned());
    }
    Arc::from(flat.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn compose_preserves_order() {
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

        let make = |tag: &'static str, o: Arc<std::sync::Mutex<Vec<&'static str>>>| -> Arc<dyn Handler> {
            Arc::new(move |ctx: &mut Context| {
                o.lock().unwrap().push(tag);
                ctx.next();
            })
        };

        let global: Vec<Arc<dyn Handler>> = vec![make("global", order.clone())];
        let group: Vec<Arc<dyn Handler>> = vec![make("group", order.clone())];
        let route: Vec<Arc<dyn Handler>> = vec![make("route", order.clone())];

        let chain = compose(vec![&global, &group, &route]);
        let mut ctx = Context::standalone(chain, false);
        ctx.next();

        assert_eq!(*order.lock().unwrap(), vec!["global", "group", "route"]);
    }

    #[test]
    fn abort_stops_remaining_handlers() {
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();

        let first: Arc<dyn Handler> = Arc::new(move |ctx: &mut Context| {
            c1.fetch_add(1, Ordering::SeqCst);
            ctx.abort();
        });
        let second: Arc<dyn Handler> = Arc::new(move |_ctx: &mut Context| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        let chain: HandlerChain = Arc::from(vec![first, second].into_boxed_slice());
        let mut ctx = Context::standalone(chain, false);
        ctx.next();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
