//! High-performance HTTP request dispatch core.
//!
//! This crate implements the REQUEST-DISPATCH layer of a web framework: a
//! radix-trie/template route table with a multi-tier lookup pipeline,
//! API-version dispatch over parallel tables, a pooled per-request
//! [`Context`](context::Context) with a cooperative middleware executor, and
//! an RFC 7231 content-negotiation engine. It is transport-agnostic — see
//! [`router::Router::handle`] for the single entry point a host HTTP server
//! calls into.

pub mod bloom;
pub mod conditional;
pub mod constraint;
pub mod context;
pub mod error;
pub mod method;
pub mod middleware;
pub mod negotiation;
pub mod pattern;
pub mod pool;
pub mod request;
pub mod router;
pub mod template;
pub mod trie;
pub mod version;

pub use constraint::{Constraint, Constraints};
pub use context::Context;
pub use error::RouterError;
pub use method::MethodSet;
pub use middleware::Handler;
pub use request::{Request, Response};
pub use router::{DispatchStats, Router, RouterOptions};
pub use version::VersionOptions;
