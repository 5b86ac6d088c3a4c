//! Route pattern parsing.
//!
//! A pattern is split once, at registration time, into a list of
//! [`Segment`]s. Both the radix trie and the compiled template are built
//! from this same decomposition so the two tiers never disagree about what
//! a pattern means.

use anyhow::{bail, Result};

/// One `/`-delimited piece of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, matched verbatim.
    Literal(String),
    /// `:name` — captures this segment as parameter `name`.
    Param(String),
    /// `*` at the tail — captures the remainder, joined by `/`, as `filepath`.
    Wildcard,
}

/// A pattern decomposed into segments, plus a couple of precomputed facts
/// the matcher tiers reuse over and over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPattern {
    pub raw: String,
    pub segments: Vec<Segment>,
    pub has_wildcard: bool,
    pub param_count: usize,
}

impl ParsedPattern {
    /// `true` if this pattern has no parameters or wildcard at all — the
    /// fast path that lands it in the Template Cache's static tier.
    pub fn is_static(&self) -> bool {
        self.param_count == 0 && !self.has_wildcard
    }

    /// Parameter names in left-to-right order, `filepath` included last if
    /// the pattern ends in a wildcard.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Wildcard => Some("filepath"),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

/// Parse a route pattern. Patterns must start with `/`; a single leading
/// slash is canonical and empty-segment collapsing is never performed,
/// so `/a//b` keeps its empty middle segment as a literal.
pub fn parse(pattern: &str) -> Result<ParsedPattern> {
    if !pattern.starts_with('/') {
        bail!("route pattern {pattern:?} must start with '/'");
    }

    let raw_segments: Vec<&str> = if pattern == "/" {
        vec![""]
    } else {
        pattern.trim_start_matches('/').split('/').collect()
    };

    let mut segments = Vec::with_capacity(raw_segments.len());
    let mut has_wildcard = false;
    let mut param_count = 0usize;

    for (i, part) in raw_segments.iter().enumerate() {
        if *part == "*" {
            if i != raw_segments.len() - 1 {
                bail!("wildcard '*' in {pattern:?} must be the final segment");
            }
            has_wildcard = true;
            segments.push(Segment::Wildcard);
        } else if let Some(name) = part.strip_prefix(':') {
            if name.is_empty() {
                bail!("empty parameter name in {pattern:?}");
            }
            param_count += 1;
            segments.push(Segment::Param(name.to_string()));
        } else if part.contains(':') || part.contains('*') {
            bail!("malformed segment {part:?} in pattern {pattern:?}");
        } else {
            segments.push(Segment::Literal(part.to_string()));
        }
    }

    Ok(ParsedPattern {
        raw: pattern.to_string(),
        segments,
        has_wildcard,
        param_count,
    })
}

/// Split a concrete request path into segments the same way `parse` splits a
/// pattern, without allocating a `Vec<String>` — callers get borrowed slices.
pub fn split_path(path: &str) -> Vec<&str> {
    if path == "/" {
        return vec![""];
    }
    path.trim_start_matches('/').split('/').collect()
}

/// Normalize an empty path to `/`, edge cases.
pub fn normalize(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}
