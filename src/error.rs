//! Error types for route registration and dispatch.

use thiserror::Error;

/// Errors raised while registering routes or compiling patterns.
///
/// Dispatch itself never errors (see [`crate::router::Router::handle`]); only
/// registration-time mistakes are represented here, matching the "Registration
/// error" row of the error table: a programmer bug, not a request-time failure.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("duplicate route for {method} {pattern}")]
    DuplicateRoute { method: String, pattern: String },

    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown parameter constraint {name:?}")]
    UnknownConstraint { name: String },

    #[error("route {pattern:?} has no handlers")]
    EmptyHandlerChain { pattern: String },

    #[error("route not found for removal: {method} {pattern}")]
    RouteNotFound { method: String, pattern: String },

    #[error("route name {name:?} is already registered")]
    DuplicateName { name: String },
}

pub type RouterResult<T> = anyhow::Result<T>;
