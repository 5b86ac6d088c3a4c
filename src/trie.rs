//! Radix trie node.
//!
//! Three small record shapes stand in for a tagged "static / parameter /
//! wildcard" node sum: a plain `HashMap` of static children, at most one
//! boxed [`ParamChild`], and at most one boxed [`WildcardChild`]. The hot
//! path branches on which of the three is present instead of going through
//! a `dyn` trait object per segment.

use crate::constraint::Constraint;
use crate::pattern::Segment;
use crate::template::CompiledTemplate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Node {
    static_children: HashMap<Box<str>, Node>,
    param_child: Option<Box<ParamChild>>,
    wildcard_child: Option<Box<WildcardChild>>,
    methods: HashMap<String, Arc<CompiledTemplate>>,
}

struct ParamChild {
    name: Box<str>,
    node: Node,
}

struct WildcardChild {
    methods: HashMap<String, Arc<CompiledTemplate>>,
}

/// Outcome of a trie lookup, split into matched, not-found, and
/// method-not-allowed.
pub enum FindOutcome {
    Matched {
        template: Arc<CompiledTemplate>,
        params: Vec<(String, String)>,
    },
    MethodNotAllowed(Vec<String>),
    NotFound,
}

/// A segment-addressed routing tree. Concurrent reads take the `RwLock` in
/// read mode (cheap, many readers at once); registration takes it in write
/// mode, serializing writers while never blocking an in-flight read that
/// started before it.
#[derive(Default)]
pub struct Trie {
    root: RwLock<Node>,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route. `strict` controls duplicate `(method, pattern)`
    /// registrations: when `false` the later registration overwrites
    /// silently; when `true` it fails fast instead (see DESIGN.md).
    pub fn insert(
        &self,
        segments: &[Segment],
        method: &str,
        template: Arc<CompiledTemplate>,
        strict: bool,
    ) -> anyhow::Result<()> {
        let mut root = self.root.write().expect("trie write lock poisoned");
        Self::insert_rec(&mut root, segments, method, template, strict)
    }

    fn insert_rec(
        node: &mut Node,
        segments: &[Segment],
        method: &str,
        template: Arc<CompiledTemplate>,
        strict: bool,
    ) -> anyhow::Result<()> {
        match segments.split_first() {
            None => {
                if strict && node.methods.contains_key(method) {
                    anyhow::bail!(
                        "duplicate route for {method} {}",
                        template.pattern.raw
                    );
                }
                node.methods.insert(method.to_string(), template);
                Ok(())
            }
            Some((Segment::Literal(label), rest)) => {
                let child = node
                    .static_children
                    .entry(label.as_str().into())
                    .or_default();
                Self::insert_rec(child, rest, method, template, strict)
            }
            Some((Segment::Param(name), rest)) => {
                if node.param_child.is_none() {
                    node.param_child = Some(Box::new(ParamChild {
                        name: name.as_str().into(),
                        node: Node::default(),
                    }));
                } else if node.param_child.as_ref().unwrap().name.as_ref() != name.as_str() {
                    tracing::debug!(
                        existing = %node.param_child.as_ref().unwrap().name,
                        incoming = %name,
                        "parameter child reused under a different name at this position"
                    );
                }
                let param = node.param_child.as_mut().unwrap();
                Self::insert_rec(&mut param.node, rest, method, template, strict)
            }
            Some((Segment::Wildcard, rest)) => {
                debug_assert!(rest.is_empty(), "wildcard must be the final segment");
                let wc = node
                    .wildcard_child
                    .get_or_insert_with(|| Box::new(WildcardChild { methods: HashMap::new() }));
                if strict && wc.methods.contains_key(method) {
                    anyhow::bail!(
                        "duplicate route for {method} {}",
                        template.pattern.raw
                    );
                }
                wc.methods.insert(method.to_string(), template);
                Ok(())
            }
        }
    }

    pub fn remove(&self, segments: &[Segment], method: &str) {
        let mut root = self.root.write().expect("trie write lock poisoned");
        Self::remove_rec(&mut root, segments, method);
    }

    fn remove_rec(node: &mut Node, segments: &[Segment], method: &str) {
        match segments.split_first() {
            None => {
                node.methods.remove(method);
            }
            Some((Segment::Literal(label), rest)) => {
                if let Some(child) = node.static_children.get_mut(label.as_str()) {
                    Self::remove_rec(child, rest, method);
                }
            }
            Some((Segment::Param(_), rest)) => {
                if let Some(param) = node.param_child.as_mut() {
                    Self::remove_rec(&mut param.node, rest, method);
                }
            }
            Some((Segment::Wildcard, _)) => {
                if let Some(wc) = node.wildcard_child.as_mut() {
                    wc.methods.remove(method);
                }
            }
        }
    }

    /// Look up `(path, method) -> FindOutcome`.
    pub fn find(&self, path_segments: &[&str], method: &str) -> FindOutcome {
        let root = self.root.read().expect("trie read lock poisoned");
        let mut params = Vec::new();
        let outcome = Self::find_rec(&root, path_segments, method, &mut params);
        outcome
    }

    fn find_rec(
        node: &Node,
        segments: &[&str],
        method: &str,
        params: &mut Vec<(String, String)>,
    ) -> FindOutcome {
        let mut allowed: Vec<String> = Vec::new();

        if segments.is_empty() {
            match terminal_match(&node.methods, method, params) {
                FindOutcome::Matched { template, params } => {
                    return FindOutcome::Matched { template, params }
                }
                FindOutcome::MethodNotAllowed(v) => merge_allowed(&mut allowed, v),
                FindOutcome::NotFound => {}
            }
        } else {
            let seg = segments[0];
            let rest = &segments[1..];

            // Precedence: exact static > parameter > wildcard.
            if let Some(child) = node.static_children.get(seg) {
                match Self::find_rec(child, rest, method, params) {
                    FindOutcome::Matched { template, params } => {
                        return FindOutcome::Matched { template, params }
                    }
                    FindOutcome::MethodNotAllowed(v) => merge_allowed(&mut allowed, v),
                    FindOutcome::NotFound => {}
                }
            }

            if let Some(param) = &node.param_child {
                let checkpoint = params.len();
                params.push((param.name.to_string(), seg.to_string()));
                match Self::find_rec(&param.node, rest, method, params) {
                    FindOutcome::Matched { template, params } => {
                        return FindOutcome::Matched { template, params }
                    }
                    FindOutcome::MethodNotAllowed(v) => {
                        merge_allowed(&mut allowed, v);
                        params.truncate(checkpoint);
                    }
                    FindOutcome::NotFound => {
                        params.truncate(checkpoint);
                    }
                }
            }
        }

        // Wildcard catches zero or more remaining segments, including the
        // empty tail — tried after static/param either way.
        if let Some(wc) = &node.wildcard_child {
            let checkpoint = params.len();
            let remainder = segments.join("/");
            params.push(("filepath".to_string(), remainder));
            match terminal_match(&wc.methods, method, params) {
                FindOutcome::Matched { template, params } => {
                    return FindOutcome::Matched { template, params }
                }
                FindOutcome::MethodNotAllowed(v) => {
                    merge_allowed(&mut allowed, v);
                    params.truncate(checkpoint);
                }
                FindOutcome::NotFound => {
                    params.truncate(checkpoint);
                }
            }
        }

        if allowed.is_empty() {
            FindOutcome::NotFound
        } else {
            FindOutcome::MethodNotAllowed(allowed)
        }
    }
}

fn merge_allowed(into: &mut Vec<String>, from: Vec<String>) {
    for m in from {
        if !into.contains(&m) {
            into.push(m);
        }
    }
}

fn constraints_pass(template: &CompiledTemplate, params: &[(String, String)]) -> bool {
    for (name, value) in params {
        if let Some(c) = template.constraints.get(name) {
            if !matches_constraint(c, value) {
                return false;
            }
        }
    }
    true
}

fn matches_constraint(c: &Constraint, value: &str) -> bool {
    c.matches(value)
}

fn terminal_match(
    methods: &HashMap<String, Arc<CompiledTemplate>>,
    method: &str,
    params: &[(String, String)],
) -> FindOutcome {
    let mut allowed = Vec::new();
    for (m, tmpl) in methods {
        if constraints_pass(tmpl, params) {
            allowed.push(m.clone());
        }
    }
    if let Some(tmpl) = methods.get(method) {
        if constraints_pass(tmpl, params) {
            return FindOutcome::Matched {
                template: tmpl.clone(),
                params: params.to_vec(),
            };
        }
    }
    if allowed.is_empty() {
        FindOutcome::NotFound
    } else {
        FindOutcome::MethodNotAllowed(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse;
    use crate::template::CompiledTemplate;
    use std::sync::Arc;

    fn insert_route(trie: &Trie, method: &str, pattern: &str) -> Arc<CompiledTemplate> {
        let parsed = parse(pattern).unwrap();
        let tmpl = Arc::new(CompiledTemplate::new(method, parsed, Arc::from(vec![]), Default::default(), None));
        trie.insert(&tmpl.pattern.segments.clone(), method, tmpl.clone(), false)
            .unwrap();
        tmpl
    }

    #[test]
    fn static_beats_param() {
        let trie = Trie::new();
        insert_route(&trie, "GET", "/users/new");
        insert_route(&trie, "GET", "/users/:id");

        match trie.find(&["users", "new"], "GET") {
            FindOutcome::Matched { template, .. } => assert_eq!(template.pattern.raw, "/users/new"),
            _ => panic!("expected match"),
        }
        match trie.find(&["users", "123"], "GET") {
            FindOutcome::Matched { template, params } => {
                assert_eq!(template.pattern.raw, "/users/:id");
                assert_eq!(params, vec![("id".to_string(), "123".to_string())]);
            }
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn wildcard_captures_remainder() {
        let trie = Trie::new();
        insert_route(&trie, "GET", "/static/*");

        match trie.find(&["static", "css", "app.css"], "GET") {
            FindOutcome::Matched { params, .. } => {
                assert_eq!(params, vec![("filepath".to_string(), "css/app.css".to_string())]);
            }
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn method_not_allowed_reports_allow_set() {
        let trie = Trie::new();
        insert_route(&trie, "GET", "/users");
        insert_route(&trie, "POST", "/users");

        match trie.find(&["users"], "DELETE") {
            FindOutcome::MethodNotAllowed(mut allowed) => {
                allowed.sort();
                assert_eq!(allowed, vec!["GET".to_string(), "POST".to_string()]);
            }
            _ => panic!("expected method not allowed"),
        }
    }

    #[test]
    fn trailing_slash_is_a_distinct_route() {
        let trie = Trie::new();
        insert_route(&trie, "GET", "/a");

        assert!(matches!(trie.find(&["a", ""], "GET"), FindOutcome::NotFound));
        assert!(matches!(trie.find(&["a"], "GET"), FindOutcome::Matched { .. }));
    }
}
