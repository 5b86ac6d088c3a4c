//! Per-version route dispatch and its atomic update protocol.
//!
//! The outer `version -> TemplateCache` map is published behind an
//! [`ArcSwap`], so lookups never block on a registration. Mutating an
//! existing version's route set does not touch the outer pointer at all —
//! `TemplateCache` (and the trie beneath it) serializes its own writes
//! internally; the outer CAS only fires when a brand-new version key is
//! introduced.

use crate::request::Request;
use crate::template::{CacheOutcome, TemplateCache};
use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type DetectCallback = dyn Fn(&Request) -> Option<String> + Send + Sync;

/// Construction-time configuration for version detection.
pub struct VersionOptions {
    pub header_name: String,
    pub query_name: String,
    pub default_version: String,
    pub valid_versions: Option<HashSet<String>>,
    pub detect_callback: Option<Arc<DetectCallback>>,
    pub strict_registration: bool,
}

impl Default for VersionOptions {
    fn default() -> Self {
        Self {
            header_name: "API-Version".to_string(),
            query_name: "version".to_string(),
            default_version: "default".to_string(),
            valid_versions: None,
            detect_callback: None,
            strict_registration: false,
        }
    }
}

impl VersionOptions {
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn query_name(mut self, name: impl Into<String>) -> Self {
        self.query_name = name.into();
        self
    }

    pub fn default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = version.into();
        self
    }

    pub fn valid_versions(mut self, versions: impl IntoIterator<Item = String>) -> Self {
        self.valid_versions = Some(versions.into_iter().collect());
        self
    }

    pub fn detect_with(mut self, f: impl Fn(&Request) -> Option<String> + Send + Sync + 'static) -> Self {
        self.detect_callback = Some(Arc::new(f));
        self
    }

    pub fn strict_registration(mut self, strict: bool) -> Self {
        self.strict_registration = strict;
        self
    }
}

/// Owns the version table and decides which one a request is routed to.
pub struct VersionDispatcher {
    options: VersionOptions,
    tables: ArcSwap<HashMap<String, Arc<TemplateCache>>>,
}

impl VersionDispatcher {
    pub fn new(options: VersionOptions) -> Self {
        let mut initial = HashMap::new();
        initial.insert(
            options.default_version.clone(),
            Arc::new(TemplateCache::new(options.strict_registration)),
        );
        Self {
            options,
            tables: ArcSwap::from_pointee(initial),
        }
    }

    /// Detection order: header, then query, then callback, then the
    /// configured default. A valid-versions set not containing the
    /// detected value falls through to the default.
    pub fn detect_version(&self, request: &Request) -> String {
        let detected = request
            .header(&self.options.header_name)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .or_else(|| {
                request
                    .query_param(&self.options.query_name)
                    .filter(|v| !v.is_empty())
                    .map(|v| v.to_string())
            })
            .or_else(|| {
                self.options
                    .detect_callback
                    .as_ref()
                    .and_then(|cb| cb(request))
            });

        match detected {
            Some(v) => {
                if let Some(valid) = &self.options.valid_versions {
                    if !valid.contains(&v) {
                        return self.options.default_version.clone();
                    }
                }
                v
            }
            None => self.options.default_version.clone(),
        }
    }

    fn table_for(&self, version: &str) -> Option<Arc<TemplateCache>> {
        self.tables.load().get(version).cloned()
    }

    /// Ensure a version's table exists, creating it via copy-on-write swap
    /// of the outer map if needed.
    fn ensure_table(&self, version: &str) -> Arc<TemplateCache> {
        if let Some(existing) = self.table_for(version) {
            return existing;
        }
        self.tables.rcu(|old| {
            if old.contains_key(version) {
                return old.clone();
            }
            let mut new_map = (**old).clone();
            new_map.insert(
                version.to_string(),
                Arc::new(TemplateCache::new(self.options.strict_registration)),
            );
            Arc::new(new_map)
        });
        self.table_for(version).expect("just inserted")
    }

    pub fn table(&self, version: &str) -> Arc<TemplateCache> {
        self.ensure_table(version)
    }

    pub fn default_table(&self) -> Arc<TemplateCache> {
        self.table(&self.options.default_version)
    }

    pub fn default_version_name(&self) -> &str {
        &self.options.default_version
    }

    /// Dispatch a request: detect the version, then delegate lookup to that
    /// version's cache.
    pub fn lookup(&self, request: &Request) -> (String, CacheOutcome) {
        let version = self.detect_version(request);
        match self.table_for(&version) {
            Some(cache) => (version, cache.lookup(&request.method, &request.path)),
            None => (version, CacheOutcome::NotFound),
        }
    }

    /// Sum of static-tier Bloom filter keys across every version table.
    pub fn total_bloom_items(&self) -> u64 {
        self.tables.load().values().map(|t| t.bloom_len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::middleware::HandlerChain;
    use crate::pattern::parse;
    use crate::template::CompiledTemplate;
    use std::collections::HashMap as Map;

    fn compile(method: &str, pattern: &str) -> Arc<CompiledTemplate> {
        Arc::new(CompiledTemplate::new(
            method,
            parse(pattern).unwrap(),
            Arc::from(Vec::new().into_boxed_slice()) as HandlerChain,
            Map::<String, Constraint>::new(),
            None,
        ))
    }

    #[test]
    fn header_detection_wins_over_default() {
        let dispatcher = VersionDispatcher::new(VersionOptions::default().default_version("v1"));
        let req = Request::new("GET", "/x").with_header("API-Version", "v2");
        assert_eq!(dispatcher.detect_version(&req), "v2");
    }

    #[test]
    fn unknown_version_falls_back_to_default() {
        let dispatcher = VersionDispatcher::new(
            VersionOptions::default()
                .default_version("v1")
                .valid_versions(["v1".to_string(), "v2".to_string()]),
        );
        let req = Request::new("GET", "/x").with_header("API-Version", "v3");
        assert_eq!(dispatcher.detect_version(&req), "v1");
    }

    #[test]
    fn versions_route_to_independent_tables() {
        let dispatcher = VersionDispatcher::new(VersionOptions::default().default_version("v1"));
        dispatcher.table("v1").register(compile("GET", "/users/:id")).unwrap();
        dispatcher.table("v2").register(compile("GET", "/users/:id")).unwrap();

        let req_v2 = Request::new("GET", "/users/42").with_header("API-Version", "v2");
        let (version, outcome) = dispatcher.lookup(&req_v2);
        assert_eq!(version, "v2");
        assert!(matches!(outcome, CacheOutcome::Matched { .. }));
    }

    #[test]
    fn query_param_detection_when_header_absent() {
        let dispatcher = VersionDispatcher::new(VersionOptions::default().default_version("v1"));
        let req = Request::new("GET", "/x").with_query("version=v2&other=1");
        assert_eq!(dispatcher.detect_version(&req), "v2");
    }
}
