//! Compiled route templates and the tiered template cache.
//!
//! Three tiers, consulted in order: a static exact-match hash table, an
//! ordered list of dynamic templates (grouped by method, specificity
//! sorted, with a lazily-built first-byte jump index), and the radix trie
//! (`crate::trie::Trie`) as the catch-all fallback for wildcards,
//! overflow-length paths, and anything the flat matcher can't express.

use crate::bloom::BloomFilter;
use crate::constraint::Constraint;
use crate::middleware::HandlerChain;
use crate::pattern::{ParsedPattern, Segment};
use crate::trie::{FindOutcome, Trie};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Stack-allocated segment buffer cap for the one-pass dynamic-tier walk —
/// paths with more segments overflow straight to the trie.
const MAX_STACK_SEGMENTS: usize = 16;

/// A precompiled, flat description of one registered `(method, pattern)`
/// pair.
pub struct CompiledTemplate {
    pub method: String,
    pub pattern: ParsedPattern,
    pub handlers: HandlerChain,
    pub constraints: HashMap<String, Constraint>,
    pub name: Option<String>,
    registration_order: usize,
}

impl CompiledTemplate {
    pub fn new(
        method: &str,
        pattern: ParsedPattern,
        handlers: HandlerChain,
        constraints: HashMap<String, Constraint>,
        name: Option<String>,
    ) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        Self {
            method: method.to_string(),
            pattern,
            handlers,
            constraints,
            name,
            registration_order: NEXT.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn static_segment_count(&self) -> usize {
        self.pattern
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn static_key(&self) -> String {
        format!("{}\0{}", self.method, self.pattern.raw)
    }

    fn constraints_pass(&self, params: &[(String, String)]) -> bool {
        params.iter().all(|(name, value)| {
            self.constraints
                .get(name)
                .map(|c| c.matches(value))
                .unwrap_or(true)
        })
    }

    /// Attempt to match this template against an already-segmented path
    /// in one pass, extracting parameters at their recorded positions.
    fn try_match(&self, path_segments: &[&str]) -> Option<Vec<(String, String)>> {
        if path_segments.len() != self.pattern.segments.len() {
            return None;
        }

        // Fast path: the extremely common `/literal/:p` shape.
        if let [Segment::Literal(lit), Segment::Param(name)] = self.pattern.segments.as_slice() {
            if path_segments[0] != lit.as_str() {
                return None;
            }
            let params = vec![(name.clone(), path_segments[1].to_string())];
            return self.constraints_pass(&params).then_some(params);
        }

        let mut params = Vec::with_capacity(self.pattern.param_count);
        for (seg_pattern, seg_value) in self.pattern.segments.iter().zip(path_segments.iter()) {
            match seg_pattern {
                Segment::Literal(lit) => {
                    if lit.as_str() != *seg_value {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.push((name.clone(), seg_value.to_string()));
                }
                Segment::Wildcard => unreachable!("wildcard templates never enter the dynamic tier"),
            }
        }

        self.constraints_pass(&params).then_some(params)
    }
}

/// Result surfaced by [`TemplateCache::lookup`].
pub enum CacheOutcome {
    Matched {
        template: Arc<CompiledTemplate>,
        params: Vec<(String, String)>,
    },
    MethodNotAllowed(Vec<String>),
    NotFound,
}

struct DynamicIndex {
    /// Per method, specificity-ordered (more static segments first).
    by_method: HashMap<String, Vec<Arc<CompiledTemplate>>>,
    /// `path[1] -> candidate indices into by_method[..]`, built lazily once
    /// a method has 10+ dynamic templates; `None` means "not built yet,
    /// iterate all candidates in order".
    first_byte: HashMap<String, Option<HashMap<u8, Vec<usize>>>>,
}

impl Default for DynamicIndex {
    fn default() -> Self {
        Self {
            by_method: HashMap::new(),
            first_byte: HashMap::new(),
        }
    }
}

/// The three-tier lookup cache, plus the radix fallback.
pub struct TemplateCache {
    bloom: RwLock<BloomFilter>,
    static_map: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
    dynamic: RwLock<DynamicIndex>,
    trie: Trie,
    strict_registration: bool,
}

impl TemplateCache {
    pub fn new(strict_registration: bool) -> Self {
        Self {
            bloom: RwLock::new(BloomFilter::new(256)),
            static_map: RwLock::new(HashMap::new()),
            dynamic: RwLock::new(DynamicIndex::default()),
            trie: Trie::new(),
            strict_registration,
        }
    }

    /// Number of keys inserted into the static-tier Bloom filter — used by
    /// [`crate::router::Router::stats`].
    pub fn bloom_len(&self) -> u64 {
        self.bloom.read().expect("bloom lock poisoned").len()
    }

    /// Register one compiled template into every tier that can serve it.
    /// The trie always gets it — it is the ground truth the flat tiers
    /// accelerate; every route still resolves correctly if a flat tier
    /// is skipped entirely.
    pub fn register(&self, template: Arc<CompiledTemplate>) -> anyhow::Result<()> {
        self.trie.insert(
            &template.pattern.segments,
            &template.method,
            template.clone(),
            self.strict_registration,
        )?;

        if template.pattern.is_static() {
            let key = template.static_key();
            let mut map = self.static_map.write().expect("static map lock poisoned");
            if self.strict_registration && map.contains_key(&key) {
                anyhow::bail!("duplicate route for {} {}", template.method, template.pattern.raw);
            }
            map.insert(key.clone(), template.clone());
            drop(map);
            self.bloom.write().expect("bloom lock poisoned").insert(&key);
        } else if !template.pattern.has_wildcard && template.pattern.segments.len() <= MAX_STACK_SEGMENTS {
            let mut dyn_index = self.dynamic.write().expect("dynamic index lock poisoned");
            let list = dyn_index
                .by_method
                .entry(template.method.clone())
                .or_default();
            list.push(template.clone());
            list.sort_by(|a, b| {
                b.static_segment_count()
                    .cmp(&a.static_segment_count())
                    .then_with(|| a.registration_order.cmp(&b.registration_order))
            });
            // Invalidate the jump index; it is rebuilt lazily on next lookup.
            dyn_index.first_byte.remove(&template.method);
        }
        // Wildcard (or overflow-length) templates live only in the trie.

        Ok(())
    }

    pub fn remove(&self, pattern: &ParsedPattern, method: &str) {
        self.trie.remove(&pattern.segments, method);

        if pattern.is_static() {
            let key = format!("{method}\0{}", pattern.raw);
            self.static_map
                .write()
                .expect("static map lock poisoned")
                .remove(&key);
            // Bloom filters don't support deletion; a stale positive merely
            // costs one extra static-map miss, never a wrong answer.
        } else if !pattern.has_wildcard {
            let mut dyn_index = self.dynamic.write().expect("dynamic index lock poisoned");
            if let Some(list) = dyn_index.by_method.get_mut(method) {
                list.retain(|t| t.pattern.raw != pattern.raw);
            }
            dyn_index.first_byte.remove(method);
        }
    }

    pub fn lookup(&self, method: &str, path: &str) -> CacheOutcome {
        let key = format!("{method}\0{path}");

        // Tier 1: Bloom pre-filter. A negative result proves absence from
        // the static tier, so tier 2 is skipped entirely.
        let maybe_static = self.bloom.read().expect("bloom lock poisoned").might_contain(&key);
        if maybe_static {
            // Tier 2: static exact-match hash table.
            if let Some(template) = self
                .static_map
                .read()
                .expect("static map lock poisoned")
                .get(&key)
                .cloned()
            {
                return CacheOutcome::Matched {
                    template,
                    params: Vec::new(),
                };
            }
        }

        // Tier 3: dynamic template list.
        let path_segments = crate::pattern::split_path(path);
        if path_segments.len() <= MAX_STACK_SEGMENTS {
            if let Some(hit) = self.lookup_dynamic(method, &path_segments) {
                return CacheOutcome::Matched {
                    template: hit.0,
                    params: hit.1,
                };
            }
        }

        // Tier 4: radix trie fallback — also the authority for 404 vs. 405,
        // since every route (static, dynamic, or wildcard) is always
        // present in the trie.
        match self.trie.find(&path_segments, method) {
            FindOutcome::Matched { template, params } => CacheOutcome::Matched { template, params },
            FindOutcome::MethodNotAllowed(allowed) => CacheOutcome::MethodNotAllowed(allowed),
            FindOutcome::NotFound => CacheOutcome::NotFound,
        }
    }

    fn lookup_dynamic(
        &self,
        method: &str,
        path_segments: &[&str],
    ) -> Option<(Arc<CompiledTemplate>, Vec<(String, String)>)> {
        let mut dyn_index = self.dynamic.write().expect("dynamic index lock poisoned");
        let list = dyn_index.by_method.get(method)?;
        if list.is_empty() {
            return None;
        }

        let first_byte = path_segments.first().and_then(|s| s.as_bytes().first().copied());

        if list.len() >= 10 {
            let index = dyn_index
                .first_byte
                .entry(method.to_string())
                .or_insert_with(|| Some(build_first_byte_index(list)));
            if let (Some(idx_map), Some(byte)) = (index.as_ref(), first_byte) {
                if let Some(candidates) = idx_map.get(&byte) {
                    for &i in candidates {
                        if let Some(params) = list[i].try_match(path_segments) {
                            return Some((list[i].clone(), params));
                        }
                    }
                    return None;
                }
            }
        }

        for template in list.iter() {
            if let Some(params) = template.try_match(path_segments) {
                return Some((template.clone(), params));
            }
        }
        None
    }
}

fn build_first_byte_index(list: &[Arc<CompiledTemplate>]) -> HashMap<u8, Vec<usize>> {
    let mut index: HashMap<u8, Vec<usize>> = HashMap::new();
    for (i, template) in list.iter().enumerate() {
        if let Some(Segment::Literal(first)) = template.pattern.segments.first() {
            if let Some(byte) = first.as_bytes().first().copied() {
                index.entry(byte).or_default().push(i);
                continue;
            }
        }
        // A leading parameter segment can match any first byte.
        for byte in 0u8..=255 {
            index.entry(byte).or_default().push(i);
        }
    }
    index
}
