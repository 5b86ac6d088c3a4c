//! HTTP method representation.
//!
//! Kept as a bitflags set so a radix terminal can store "which methods are
//! registered here" in a single machine word and the 405 path can derive the
//! `Allow` header from it without walking a `Vec`.

use bitflags::bitflags;

bitflags! {
    /// HTTP methods represented as bit flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct MethodSet: u16 {
        const GET     = 1 << 0;
        const POST    = 1 << 1;
        const PUT     = 1 << 2;
        const DELETE  = 1 << 3;
        const PATCH   = 1 << 4;
        const HEAD    = 1 << 5;
        const OPTIONS = 1 << 6;
        const CONNECT = 1 << 7;
        const TRACE   = 1 << 8;
    }
}

impl MethodSet {
    /// Parse a single HTTP method from its uppercase name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(MethodSet::GET),
            "POST" => Some(MethodSet::POST),
            "PUT" => Some(MethodSet::PUT),
            "DELETE" => Some(MethodSet::DELETE),
            "PATCH" => Some(MethodSet::PATCH),
            "HEAD" => Some(MethodSet::HEAD),
            "OPTIONS" => Some(MethodSet::OPTIONS),
            "CONNECT" => Some(MethodSet::CONNECT),
            "TRACE" => Some(MethodSet::TRACE),
            _ => None,
        }
    }

    /// `true` for methods that must not modify state (used by conditional
    /// request helpers to pick 304 vs. 412 semantics).
    pub fn is_safe(s: &str) -> bool {
        matches!(s, "GET" | "HEAD")
    }

    /// Render as a sorted, comma-separated `Allow` header value.
    pub fn allow_header(self) -> String {
        const ORDER: &[(MethodSet, &str)] = &[
            (MethodSet::CONNECT, "CONNECT"),
            (MethodSet::DELETE, "DELETE"),
            (MethodSet::GET, "GET"),
            (MethodSet::HEAD, "HEAD"),
            (MethodSet::OPTIONS, "OPTIONS"),
            (MethodSet::PATCH, "PATCH"),
            (MethodSet::POST, "POST"),
            (MethodSet::PUT, "PUT"),
            (MethodSet::TRACE, "TRACE"),
        ];
        ORDER
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods() {
        assert_eq!(MethodSet::from_str("GET"), Some(MethodSet::GET));
        assert_eq!(MethodSet::from_str("bogus"), None);
    }

    #[test]
    fn allow_header_is_sorted_and_joined() {
        let set = MethodSet::POST | MethodSet::GET | MethodSet::DELETE;
        assert_eq!(set.allow_header(), "DELETE, GET, POST");
    }

    #[test]
    fn safe_methods() {
        assert!(MethodSet::is_safe("GET"));
        assert!(MethodSet::is_safe("HEAD"));
        assert!(!MethodSet::is_safe("POST"));
    }
}
