//! Per-request context (X).
//!
//! Exclusively owned by the single task handling one request; never shared
//! across tasks. Parameters live in two parallel fixed arrays sized for
//! the common case, with an overflow map for the rare route that needs more
//! than eight.

use crate::middleware::HandlerChain;
use crate::negotiation::AcceptSpec;
use crate::request::{Request, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed-array capacity before parameters spill into the overflow map.
pub const INLINE_PARAM_CAPACITY: usize = 8;

/// A cooperative cancellation signal a host transport can fire to stop a
/// chain mid-flight. Cloning shares the flag.
#[derive(Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request state handed to every handler in the chain.
pub struct Context {
    request: Option<Request>,
    response: Option<Response>,

    param_keys: [Option<Box<str>>; INLINE_PARAM_CAPACITY],
    param_values: [Option<Box<str>>; INLINE_PARAM_CAPACITY],
    param_count: usize,
    overflow: Option<HashMap<Box<str>, Box<str>>>,

    handlers: HandlerChain,
    cursor: i64,
    aborted: bool,
    check_cancellation: bool,
    cancellation: Option<CancellationHandle>,

    errors: Option<Vec<anyhow::Error>>,

    cached_accept_header: Option<String>,
    cached_accept_specs: Option<Vec<AcceptSpec>>,

    route_pattern: Option<String>,
    version: Option<String>,
}

impl Context {
    fn empty(check_cancellation: bool) -> Self {
        Self {
            request: None,
            response: None,
            param_keys: Default::default(),
            param_values: Default::default(),
            param_count: 0,
            overflow: None,
            handlers: Arc::from(Vec::new().into_boxed_slice()),
            cursor: -1,
            aborted: false,
            check_cancellation,
            cancellation: None,
            errors: None,
            cached_accept_header: None,
            cached_accept_specs: None,
            route_pattern: None,
            version: None,
        }
    }

    /// Construct a context outside of a pool, with a given handler chain
    /// already installed — used by [`crate::pool::ContextPool`] and by tests
    /// that exercise the executor in isolation.
    pub fn standalone(handlers: HandlerChain, check_cancellation: bool) -> Self {
        let mut ctx = Self::empty(check_cancellation);
        ctx.handlers = handlers;
        ctx
    }

    /// Preallocate the overflow map, used by the large pool tier so its
    /// contexts never allocate one on first overflow.
    pub fn with_overflow_capacity(mut self, capacity: usize) -> Self {
        if capacity > 0 {
            self.overflow = Some(HashMap::with_capacity(capacity));
        }
        self
    }

    pub(crate) fn attach(
        &mut self,
        request: Request,
        handlers: HandlerChain,
        cancellation: Option<CancellationHandle>,
    ) {
        self.request = Some(request);
        self.response = Some(Response::new());
        self.handlers = handlers;
        self.cancellation = cancellation;
        self.cursor = -1;
    }

    pub fn request(&self) -> &Request {
        self.request.as_ref().expect("context has no attached request")
    }

    pub fn response(&self) -> &Response {
        self.response.as_ref().expect("context has no attached response")
    }

    pub fn response_mut(&mut self) -> &mut Response {
        self.response.as_mut().expect("context has no attached response")
    }

    pub fn take_response(&mut self) -> Response {
        self.response.take().unwrap_or_default()
    }

    /// Conditional-request helpers, wired to the attached request and
    /// response so callers don't need to split the borrow themselves.
    pub fn check_if_none_match(&mut self, etag: Option<&str>, last_modified: Option<&str>) -> bool {
        let request = self.request.as_ref().expect("context has no attached request");
        let response = self.response.as_mut().expect("context has no attached response");
        crate::conditional::if_none_match(request, response, etag, last_modified)
    }

    pub fn check_if_match(&mut self, etag: Option<&str>, last_modified: Option<&str>) -> bool {
        let request = self.request.as_ref().expect("context has no attached request");
        let response = self.response.as_mut().expect("context has no attached response");
        crate::conditional::if_match(request, response, etag, last_modified)
    }

    /// Number of parameters currently stored (fixed-array + overflow).
    pub fn param_count(&self) -> usize {
        self.param_count + self.overflow.as_ref().map_or(0, |m| m.len())
    }

    /// Append one path parameter, spilling to the overflow map past the
    /// eighth — 8 is a soft limit, never a hard rejection.
    pub fn push_param(&mut self, name: &str, value: &str) {
        if self.param_count < INLINE_PARAM_CAPACITY {
            self.param_keys[self.param_count] = Some(name.into());
            self.param_values[self.param_count] = Some(value.into());
            self.param_count += 1;
        } else {
            self.overflow
                .get_or_insert_with(HashMap::new)
                .insert(name.into(), value.into());
        }
    }

    /// Linear scan over the fixed arrays, then the overflow map.
    pub fn param(&self, name: &str) -> Option<&str> {
        for i in 0..self.param_count {
            if self.param_keys[i].as_deref() == Some(name) {
                return self.param_values[i].as_deref();
            }
        }
        self.overflow
            .as_ref()
            .and_then(|m| m.get(name))
            .map(|v| v.as_ref())
    }

    pub fn set_route_pattern(&mut self, pattern: String) {
        self.route_pattern = Some(pattern);
    }

    pub fn route_pattern(&self) -> Option<&str> {
        self.route_pattern.as_deref()
    }

    pub fn set_version(&mut self, version: String) {
        self.version = Some(version);
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Advance the cursor by one step and invoke that handler, if any. A
    /// handler that never calls `next()` itself simply ends the chain here
    /// — this method does not loop; each handler drives its own
    /// continuation.
    pub fn next(&mut self) {
        if self.aborted {
            return;
        }
        if self.check_cancellation && self.is_cancelled() {
            return;
        }
        self.cursor += 1;
        let idx = self.cursor;
        if idx >= 0 && (idx as usize) < self.handlers.len() {
            let handler = self.handlers[idx as usize].clone();
            handler.call(self);
        }
    }

    /// Stop the chain: already-executed handlers are unaffected, but no
    /// further handler will run from subsequent `next` calls.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|c| c.is_cancelled())
            .unwrap_or(false)
    }

    /// Append an error to the lazily allocated list; response writing does
    /// not auto-collect, callers opt in explicitly.
    pub fn error(&mut self, e: anyhow::Error) {
        self.errors.get_or_insert_with(Vec::new).push(e);
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        self.errors.as_deref().unwrap_or(&[])
    }

    pub(crate) fn cached_accept(&self, header: &str) -> Option<&[AcceptSpec]> {
        if self.cached_accept_header.as_deref() == Some(header) {
            self.cached_accept_specs.as_deref()
        } else {
            None
        }
    }

    pub(crate) fn cache_accept(&mut self, header: String, specs: Vec<AcceptSpec>) {
        self.cached_accept_header = Some(header);
        self.cached_accept_specs = Some(specs);
    }

    /// Clear everything that must not leak into the next request: used
    /// parameter slots only, the whole overflow map, cached negotiation
    /// state, and request/response/handler fields. Never allocates.
    pub fn reset(&mut self) {
        for i in 0..self.param_count {
            self.param_keys[i] = None;
            self.param_values[i] = None;
        }
        self.param_count = 0;
        if let Some(map) = self.overflow.as_mut() {
            map.clear();
        }
        self.request = None;
        self.response = None;
        self.handlers = Arc::from(Vec::new().into_boxed_slice());
        self.cursor = -1;
        self.aborted = false;
        self.cancellation = None;
        self.errors = None;
        self.cached_accept_header = None;
        self.cached_accept_specs = None;
        self.route_pattern = None;
        self.version = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_roundtrip_through_fixed_array() {
        let mut ctx = Context::standalone(Arc::from(Vec::new().into_boxed_slice()), false);
        ctx.push_param("id", "42");
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.param("missing"), None);
    }

    #[test]
    fn ninth_parameter_spills_to_overflow() {
        let mut ctx = Context::standalone(Arc::from(Vec::new().into_boxed_slice()), false);
        for i in 0..9 {
            ctx.push_param(&format!("p{i}"), &i.to_string());
        }
        assert_eq!(ctx.param_count(), 9);
        assert_eq!(ctx.param("p8"), Some("8"));
        assert_eq!(ctx.param("p0"), Some("0"));
    }

    #[test]
    fn reset_clears_only_used_slots_and_handlers() {
        let mut ctx = Context::standalone(Arc::from(Vec::new().into_boxed_slice()), false);
        ctx.push_param("id", "42");
        ctx.set_route_pattern("/users/:id".to_string());
        ctx.reset();
        assert_eq!(ctx.param_count(), 0);
        assert_eq!(ctx.param("id"), None);
        assert_eq!(ctx.route_pattern(), None);
    }

    #[test]
    fn cancellation_handle_stops_the_chain() {
        let handle = CancellationHandle::new();
        let handler: Arc<dyn crate::middleware::Handler> = Arc::new({
            let handle = handle.clone();
            move |_ctx: &mut Context| {
                handle.cancel();
            }
        });
        let chain: HandlerChain = Arc::from(vec![handler.clone(), handler].into_boxed_slice());
        let mut ctx = Context::standalone(chain, true);
        ctx.cancellation = Some(handle);
        ctx.next();
        // First handler ran and cancelled; a further external next() must
        // not invoke the second handler.
        ctx.next();
        assert_eq!(ctx.cursor, 0);
    }
}
