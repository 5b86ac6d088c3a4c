//! Conditional request helpers.
//!
//! These decide 304/412 and short-circuit the response; they do not
//! generate `ETag`/`Last-Modified` values themselves — that stays with the
//! handler — but they do consume the validators a handler already computed.

use crate::method::MethodSet;
use crate::request::{Request, Response};

/// Weak-compare two ETags: strip an optional `W/` prefix, compare the
/// remaining quoted value verbatim. `*` matches anything.
fn etag_matches(candidate: &str, current: &str) -> bool {
    if candidate.trim() == "*" {
        return true;
    }
    let strip = |s: &str| s.trim().strip_prefix("W/").unwrap_or(s.trim());
    strip(candidate) == strip(current)
}

fn any_etag_matches(header: &str, current: &str) -> bool {
    header.split(',').any(|c| etag_matches(c, current))
}

/// `GET`/`HEAD` conditional check: if `If-None-Match` (preferred) or
/// `If-Modified-Since` indicates the client's cached copy is still valid,
/// write 304 and return `true` — the handler must not write a body.
pub fn if_none_match(request: &Request, response: &mut Response, etag: Option<&str>, last_modified: Option<&str>) -> bool {
    if !MethodSet::is_safe(&request.method) {
        return false;
    }

    if let (Some(header), Some(current)) = (request.header("if-none-match"), etag) {
        if any_etag_matches(header, current) {
            response.status = 304;
            response.mark_header_written();
            return true;
        }
        return false;
    }

    if let (Some(header), Some(current)) = (request.header("if-modified-since"), last_modified) {
        if header.trim() == current.trim() {
            response.status = 304;
            response.mark_header_written();
            return true;
        }
    }

    false
}

/// Unsafe-method conditional check: if `If-Match` (preferred) or
/// `If-Unmodified-Since` indicates a precondition failure, write 412 and
/// return `true`.
pub fn if_match(request: &Request, response: &mut Response, etag: Option<&str>, last_modified: Option<&str>) -> bool {
    if MethodSet::is_safe(&request.method) {
        return false;
    }

    if let Some(header) = request.header("if-match") {
        let current = etag.unwrap_or("");
        if !any_etag_matches(header, current) {
            response.status = 412;
            response.mark_header_written();
            return true;
        }
        return false;
    }

    if let (Some(header), Some(current)) = (request.header("if-unmodified-since"), last_modified) {
        if header.trim() != current.trim() {
            response.status = 412;
            response.mark_header_written();
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_etag_match_yields_304_on_get() {
        let req = Request::new("GET", "/thing").with_header("If-None-Match", "W/\"abc\"");
        let mut resp = Response::new();
        assert!(if_none_match(&req, &mut resp, Some("W/\"abc\""), None));
        assert_eq!(resp.status, 304);
    }

    #[test]
    fn mismatched_if_match_yields_412_on_unsafe_method() {
        let req = Request::new("PUT", "/thing").with_header("If-Match", "\"other\"");
        let mut resp = Response::new();
        assert!(if_match(&req, &mut resp, Some("\"abc\""), None));
        assert_eq!(resp.status, 412);
    }

    #[test]
    fn matching_if_match_does_not_short_circuit() {
        let req = Request::new("PUT", "/thing").with_header("If-Match", "\"abc\"");
        let mut resp = Response::new();
        assert!(!if_match(&req, &mut resp, Some("\"abc\""), None));
        assert_eq!(resp.status, 0);
    }

    #[test]
    fn no_conditional_headers_is_a_no_op() {
        let req = Request::new("GET", "/thing");
        let mut resp = Response::new();
        assert!(!if_none_match(&req, &mut resp, Some("\"abc\""), None));
    }
}
