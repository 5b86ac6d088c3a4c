//! Minimal transport-agnostic request/response handles.
//!
//! The dispatch core is an HTTP handler pluggable into any compliant HTTP
//! server; it does not own a socket or a parser. These two types are the
//! narrow surface a host adapter maps its real request/response objects
//! onto before calling [`crate::router::Router::handle`].

use std::collections::HashMap;

/// An inbound request as seen by the dispatch core.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Raw query string, without the leading `?` (never pre-parsed into a
    /// map — scans it directly to avoid an allocation on the version
    /// detection hot path).
    pub query: String,
    pub headers: HashMap<String, Vec<String>>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: String::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// First value of a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Scan the raw query string for `key=value` without allocating a map.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.split('&').find_map(|pair| {
            let mut it = pair.splitn(2, '=');
            let k = it.next()?;
            if k == key {
                Some(it.next().unwrap_or(""))
            } else {
                None
            }
        })
    }
}

/// An outbound response as seen by the dispatch core.
#[derive(Debug, Default)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    header_written: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: Vec::new(),
            header_written: false,
        }
    }

    /// `true` once the status line/headers have conceptually been flushed —
    /// response helpers consult this to avoid double-writing.
    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn mark_header_written(&mut self) {
        self.header_written = true;
    }

    /// Set a response header, stripping CR/LF from the value and emitting a
    /// diagnostic event if any were found.
    pub fn header(&mut self, name: &str, value: &str) {
        let stripped: String = value.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        if stripped.len() != value.len() {
            tracing::warn!(header = name, "stripped CR/LF from outgoing header value");
        }
        self.headers.push((name.to_string(), stripped));
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Merge additional field names into `Vary`, canonicalizing case and
    /// deduplicating.
    pub fn vary(&mut self, fields: &[&str]) {
        let existing = self
            .header_value("Vary")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let mut names: Vec<String> = existing
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| canonical_field_name(s))
            .collect();
        for f in fields {
            let canon = canonical_field_name(f);
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&canon)) {
                names.push(canon);
            }
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Vary"));
        if !names.is_empty() {
            self.header("Vary", &names.join(", "));
        }
    }

    /// 204 helper.
    pub fn no_content(&mut self) {
        self.status = 204;
        self.mark_header_written();
    }

    /// 301/302/303/307 helper.
    pub fn redirect(&mut self, code: u16, location: &str) {
        self.status = code;
        self.header("Location", location);
        self.mark_header_written();
    }

    /// 415 helper for a required content-type mismatch.
    pub fn unsupported_media_type(&mut self) {
        self.status = 415;
        self.mark_header_written();
    }

    /// 413 helper for a size-limited body read that exceeded its cap.
    pub fn payload_too_large(&mut self) {
        self.status = 413;
        self.mark_header_written();
    }

    /// 405, with the computed `Allow` set.
    pub fn method_not_allowed(&mut self, allow: &str) {
        self.status = 405;
        self.header("Allow", allow);
        self.mark_header_written();
    }

    /// 404.
    pub fn not_found(&mut self) {
        self.status = 404;
        self.mark_header_written();
    }
}

fn canonical_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut start_of_word = true;
    for c in name.trim().chars() {
        if c == '-' {
            out.push(c);
            start_of_word = true;
        } else if start_of_word {
            out.extend(c.to_uppercase());
            start_of_word = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::new("GET", "/").with_header("API-Version", "v2");
        assert_eq!(req.header("api-version"), Some("v2"));
    }

    #[test]
    fn query_param_scans_without_parsing_whole_string() {
        let req = Request::new("GET", "/").with_query("a=1&version=v3&b=2");
        assert_eq!(req.query_param("version"), Some("v3"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn header_injection_is_stripped() {
        let mut resp = Response::new();
        resp.header("X-Test", "abc\r\ninjected: true");
        assert_eq!(resp.header_value("X-Test"), Some("abcinjected: true"));
    }

    #[test]
    fn vary_merges_and_dedupes() {
        let mut resp = Response::new();
        resp.header("Vary", "accept-encoding");
        resp.vary(&["Accept", "Accept-Encoding"]);
        assert_eq!(resp.header_value("Vary"), Some("Accept-Encoding, Accept"));
    }

    #[test]
    fn method_not_allowed_sets_allow() {
        let mut resp = Response::new();
        resp.method_not_allowed("GET, POST");
        assert_eq!(resp.status, 405);
        assert_eq!(resp.header_value("Allow"), Some("GET, POST"));
    }
}
