//! Route registration API and the top-level `Router` that wires version
//! dispatch, the template cache, the context pool, and middleware together.

use crate::constraint::Constraint;
use crate::context::CancellationHandle;
use crate::error::RouterError;
use crate::middleware::{compose, Handler, HandlerChain};
use crate::pattern::{self, ParsedPattern, Segment};
use crate::pool::{ContextPool, PoolStats};
use crate::request::{Request, Response};
use crate::template::{CacheOutcome, CompiledTemplate};
use crate::version::{VersionDispatcher, VersionOptions};
use anyhow::Context as _;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Construction-time configuration for the whole router.
pub struct RouterOptions {
    pub version: VersionOptions,
    pub check_cancellation: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            version: VersionOptions::default(),
            check_cancellation: true,
        }
    }
}

impl RouterOptions {
    pub fn version(mut self, version: VersionOptions) -> Self {
        self.version = version;
        self
    }

    pub fn check_cancellation(mut self, check: bool) -> Self {
        self.check_cancellation = check;
        self
    }
}

/// Combined pool/cache statistics, serializable for an observability export.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DispatchStats {
    pub pool: PoolStats,
    pub bloom_items: u64,
}

struct RouteDescriptor {
    version: String,
    method: String,
    pattern: ParsedPattern,
    handlers: HandlerChain,
    constraints: HashMap<String, Constraint>,
    name: Option<String>,
}

/// The dispatch core: version tables, the pooled contexts that ride through
/// them, and the registration surface handlers are attached through.
pub struct Router {
    dispatcher: VersionDispatcher,
    pool: ContextPool,
    global_middleware: Vec<Arc<dyn Handler>>,
    routes: RwLock<Vec<RouteDescriptor>>,
    names: RwLock<HashMap<String, ParsedPattern>>,
}

impl Router {
    pub fn new(options: RouterOptions) -> Self {
        Self {
            dispatcher: VersionDispatcher::new(options.version),
            pool: ContextPool::new(options.check_cancellation),
            global_middleware: Vec::new(),
            routes: RwLock::new(Vec::new()),
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Install middleware that runs ahead of every group and route chain.
    pub fn use_middleware(&mut self, handler: impl Handler + 'static) {
        self.global_middleware.push(Arc::new(handler));
    }

    fn default_version(&self) -> String {
        self.dispatcher.default_version_name().to_string()
    }

    /// Register one route. `version: None` targets the distinguished
    /// default table. The router's global middleware is prepended exactly
    /// once, ahead of `handlers`.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        version: Option<&str>,
        method: &str,
        pattern_str: &str,
        handlers: Vec<Arc<dyn Handler>>,
        constraints: HashMap<String, Constraint>,
        name: Option<&str>,
    ) -> anyhow::Result<()> {
        if handlers.is_empty() {
            return Err(RouterError::EmptyHandlerChain {
                pattern: pattern_str.to_string(),
            }
            .into());
        }
        let chain = compose(vec![&self.global_middleware, &handlers]);
        self.register_chain(version, method, pattern_str, chain, constraints, name)
    }

    /// Register one route from an already-composed handler chain, with no
    /// further middleware prepended. `mount` uses this so a mounted route's
    /// chain (which may already include the parent's global middleware)
    /// isn't composed with it a second time.
    #[allow(clippy::too_many_arguments)]
    fn register_chain(
        &self,
        version: Option<&str>,
        method: &str,
        pattern_str: &str,
        chain: HandlerChain,
        constraints: HashMap<String, Constraint>,
        name: Option<&str>,
    ) -> anyhow::Result<()> {
        if chain.is_empty() {
            return Err(RouterError::EmptyHandlerChain {
                pattern: pattern_str.to_string(),
            }
            .into());
        }

        let parsed = pattern::parse(pattern_str)
            .with_context(|| format!("compiling route pattern {pattern_str:?}"))?;

        let version = version.map(str::to_string).unwrap_or_else(|| self.default_version());

        if let Some(name) = name {
            let mut names = self.names.write().expect("names lock poisoned");
            if names.contains_key(name) {
                return Err(RouterError::DuplicateName {
                    name: name.to_string(),
                }
                .into());
            }
            names.insert(name.to_string(), parsed.clone());
        }

        let template = Arc::new(CompiledTemplate::new(
            method,
            parsed.clone(),
            chain.clone(),
            constraints.clone(),
            name.map(str::to_string),
        ));
        self.dispatcher.table(&version).register(template)?;

        self.routes.write().expect("routes lock poisoned").push(RouteDescriptor {
            version,
            method: method.to_string(),
            pattern: parsed,
            handlers: chain,
            constraints,
            name: name.map(str::to_string),
        });

        Ok(())
    }

    pub fn get(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.register(None, "GET", pattern, handlers, HashMap::new(), None)
    }

    pub fn post(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.register(None, "POST", pattern, handlers, HashMap::new(), None)
    }

    pub fn put(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.register(None, "PUT", pattern, handlers, HashMap::new(), None)
    }

    pub fn delete(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.register(None, "DELETE", pattern, handlers, HashMap::new(), None)
    }

    pub fn patch(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.register(None, "PATCH", pattern, handlers, HashMap::new(), None)
    }

    /// Start a path-prefixed group; middleware passed here runs after the
    /// router's global middleware and before the route's own handlers.
    pub fn group<'a>(&'a self, prefix: &str, middleware: Vec<Arc<dyn Handler>>) -> Group<'a> {
        Group {
            router: self,
            prefix: prefix.trim_end_matches('/').to_string(),
            middleware,
        }
    }

    /// Copy every route from `sub` into this router under `prefix`,
    /// preserving each route's full observable pattern — never collapsed
    /// into a catch-all. `route.handlers` already carries `sub`'s own global
    /// middleware, so when `inherit_global_middleware` is set, this router's
    /// global middleware is composed in directly rather than routed back
    /// through `register` (which would prepend it a second time).
    pub fn mount(&self, prefix: &str, sub: &Router, inherit_global_middleware: bool) -> anyhow::Result<()> {
        let prefix = prefix.trim_end_matches('/');
        for route in sub.routes.read().expect("routes lock poisoned").iter() {
            let full_pattern = format!("{prefix}{}", route.pattern.raw);
            let chain = if inherit_global_middleware {
                compose(vec![&self.global_middleware, &route.handlers])
            } else {
                route.handlers.clone()
            };
            self.register_chain(
                Some(&route.version),
                &route.method,
                &full_pattern,
                chain,
                route.constraints.clone(),
                route.name.as_deref(),
            )?;
        }
        Ok(())
    }

    /// Reverse lookup by route name. Parameters are substituted
    /// positionally by name; a missing parameter fails the lookup.
    pub fn url_for(&self, name: &str, params: &HashMap<&str, &str>) -> Option<String> {
        let names = self.names.read().expect("names lock poisoned");
        let pattern = names.get(name)?;
        let mut parts = Vec::with_capacity(pattern.segments.len());
        for segment in &pattern.segments {
            match segment {
                Segment::Literal(lit) => parts.push(lit.clone()),
                Segment::Param(name) => parts.push(params.get(name.as_str())?.to_string()),
                Segment::Wildcard => parts.push(params.get("filepath")?.to_string()),
            }
        }
        Some(format!("/{}", parts.join("/")))
    }

    /// Dispatch a request through version detection, the lookup pipeline,
    /// and the middleware chain.
    pub fn handle(&self, request: Request, cancellation: Option<CancellationHandle>) -> Response {
        let (version, outcome) = self.dispatcher.lookup(&request);

        match outcome {
            CacheOutcome::Matched { template, params } => {
                tracing::trace!(method = %request.method, path = %request.path, version = %version, "dispatch matched");
                let mut ctx = self.pool.get(params.len());
                for (name, value) in &params {
                    ctx.push_param(name, value);
                }
                ctx.set_route_pattern(template.pattern.raw.clone());
                ctx.set_version(version);
                self.pool.attach(&mut ctx, request, template.handlers.clone(), cancellation);
                ctx.next();
                let response = ctx.take_response();
                self.pool.put(ctx);
                response
            }
            CacheOutcome::MethodNotAllowed(mut allowed) => {
                tracing::debug!(method = %request.method, path = %request.path, "method not allowed");
                allowed.sort();
                let mut response = Response::new();
                response.method_not_allowed(&allowed.join(", "));
                response
            }
            CacheOutcome::NotFound => {
                tracing::trace!(method = %request.method, path = %request.path, "no route matched");
                let mut response = Response::new();
                response.not_found();
                response
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            pool: self.pool.stats(),
            bloom_items: self.dispatcher.total_bloom_items(),
        }
    }
}

/// A path-prefixed, middleware-carrying registrar returned by
/// [`Router::group`].
pub struct Group<'a> {
    router: &'a Router,
    prefix: String,
    middleware: Vec<Arc<dyn Handler>>,
}

impl<'a> Group<'a> {
    fn full_pattern(&self, pattern: &str) -> String {
        format!("{}{}", self.prefix, pattern)
    }

    fn chain(&self, handlers: Vec<Arc<dyn Handler>>) -> Vec<Arc<dyn Handler>> {
        self.middleware.iter().cloned().chain(handlers).collect()
    }

    pub fn get(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.router.register(
            None,
            "GET",
            &self.full_pattern(pattern),
            self.chain(handlers),
            HashMap::new(),
            None,
        )
    }

    pub fn post(&self, pattern: &str, handlers: Vec<Arc<dyn Handler>>) -> anyhow::Result<()> {
        self.router.register(
            None,
            "POST",
            &self.full_pattern(pattern),
            self.chain(handlers),
            HashMap::new(),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    fn handler(status: u16) -> Arc<dyn Handler> {
        Arc::new(move |ctx: &mut crate::context::Context| {
            ctx.response_mut().status = status;
            ctx.response_mut().mark_header_written();
            ctx.next();
        })
    }

    #[test]
    fn versioned_dispatch_selects_per_header() {
        let router = Router::new(RouterOptions::default().version(VersionOptions::default().default_version("v1")));
        router
            .register(Some("v1"), "GET", "/users/:id", vec![handler(200)], HashMap::new(), None)
            .unwrap();
        router
            .register(Some("v2"), "GET", "/users/:id", vec![handler(200)], HashMap::new(), None)
            .unwrap();

        let req = Request::new("GET", "/users/42").with_header("API-Version", "v2");
        let resp = router.handle(req, None);
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn unmatched_path_is_404() {
        let router = Router::new(RouterOptions::default());
        let resp = router.handle(Request::new("GET", "/nope"), None);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn wrong_method_is_405_with_sorted_allow() {
        let router = Router::new(RouterOptions::default());
        router.get("/users", vec![handler(200)]).unwrap();
        router.post("/users", vec![handler(200)]).unwrap();

        let resp = router.handle(Request::new("DELETE", "/users"), None);
        assert_eq!(resp.status, 405);
        assert_eq!(resp.header_value("Allow"), Some("GET, POST"));
    }

    #[test]
    fn constraint_failure_falls_through_to_less_specific_route() {
        let router = Router::new(RouterOptions::default());
        let mut constraints = HashMap::new();
        constraints.insert("id".to_string(), Constraint::int());
        router
            .register(None, "GET", "/users/:id", vec![handler(200)], constraints, None)
            .unwrap();

        let resp = router.handle(Request::new("GET", "/users/abc"), None);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn named_route_resolves_via_url_for() {
        let router = Router::new(RouterOptions::default());
        router
            .register(None, "GET", "/users/:id", vec![handler(200)], HashMap::new(), Some("users.show"))
            .unwrap();

        let mut params = HashMap::new();
        params.insert("id", "7");
        assert_eq!(router.url_for("users.show", &params), Some("/users/7".to_string()));
    }

    #[test]
    fn mount_preserves_full_pattern() {
        let sub = Router::new(RouterOptions::default());
        sub.get("/users/:id", vec![handler(200)]).unwrap();

        let parent = Router::new(RouterOptions::default());
        parent.mount("/api/v1", &sub, false).unwrap();

        let resp = parent.handle(Request::new("GET", "/api/v1/users/7"), None);
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn mount_without_inherit_skips_parent_global_middleware() {
        let sub = Router::new(RouterOptions::default());
        sub.get("/ping", vec![handler(204)]).unwrap();

        let count = Arc::new(AtomicU16::new(0));
        let mut parent = Router::new(RouterOptions::default());
        let c = count.clone();
        parent.use_middleware(move |ctx: &mut crate::context::Context| {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.next();
        });
        parent.mount("/api", &sub, false).unwrap();

        parent.handle(Request::new("GET", "/api/ping"), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mount_with_inherit_runs_parent_global_middleware_exactly_once() {
        let sub = Router::new(RouterOptions::default());
        sub.get("/ping", vec![handler(204)]).unwrap();

        let count = Arc::new(AtomicU16::new(0));
        let mut parent = Router::new(RouterOptions::default());
        let c = count.clone();
        parent.use_middleware(move |ctx: &mut crate::context::Context| {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.next();
        });
        parent.mount("/api", &sub, true).unwrap();

        let resp = parent.handle(Request::new("GET", "/api/ping"), None);
        assert_eq!(resp.status, 204);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn middleware_runs_before_route_handlers_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut router = Router::new(RouterOptions::default());
        let o1 = order.clone();
        router.use_middleware(move |ctx: &mut crate::context::Context| {
            o1.lock().unwrap().push("global");
            ctx.next();
        });
        let o2 = order.clone();
        router
            .get(
                "/x",
                vec![Arc::new(move |ctx: &mut crate::context::Context| {
                    o2.lock().unwrap().push("route");
                    ctx.response_mut().status = 200;
                    ctx.response_mut().mark_header_written();
                })],
            )
            .unwrap();

        router.handle(Request::new("GET", "/x"), None);
        assert_eq!(*order.lock().unwrap(), vec!["global", "route"]);
    }

    #[test]
    fn groups_inherit_router_global_middleware() {
        let count = Arc::new(AtomicU16::new(0));
        let mut router = Router::new(RouterOptions::default());
        let c = count.clone();
        router.use_middleware(move |ctx: &mut crate::context::Context| {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.next();
        });
        router.group("/api", vec![]).get("/ping", vec![handler(204)]).unwrap();

        router.handle(Request::new("GET", "/api/ping"), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
