//! Route table for test image servers
//!
//! Patterns follow the usual HTTP multiplexer rules:
//! - `/path` matches only `/path`
//! - `/dir/` matches `/dir/` and everything below it
//! - `/` matches every request no other pattern claims
//!
//! The most specific pattern wins; anything unclaimed is a 404. Segments
//! starting with `:` are plain literals, so `/:id` only matches `/:id`.

use super::graceful::ServeError;
use axum::routing::MethodRouter;
use axum::Router;
use std::collections::HashMap;
use tracing::debug;

/// Path pattern -> handler
pub type HandlerMap = HashMap<String, MethodRouter>;

/// Pattern that matches every path
pub const ROOT_PATTERN: &str = "/";

/// Handler map with `handler` mounted at the root pattern
pub fn single_handler(handler: MethodRouter) -> HandlerMap {
    HashMap::from([(ROOT_PATTERN.to_string(), handler)])
}

/// Reject patterns the router cannot express literally
fn validate_pattern(pattern: &str) -> Result<(), ServeError> {
    let has_router_syntax = pattern.contains(['{', '}', '*']);
    if !pattern.starts_with('/') || has_router_syntax {
        return Err(ServeError::InvalidPattern(pattern.to_string()));
    }
    Ok(())
}

/// Build the axum router for a handler map
pub fn build_router(handlers: HandlerMap) -> Result<Router, ServeError> {
    let mut router = Router::new().without_v07_checks();

    for (pattern, handler) in handlers {
        validate_pattern(&pattern)?;
        debug!(pattern = %pattern, "Registering handler");

        router = if pattern == ROOT_PATTERN {
            router
                .route(ROOT_PATTERN, handler.clone())
                .fallback_service(handler)
        } else if pattern.ends_with('/') {
            let subtree = format!("{}{{*rest}}", pattern);
            router
                .route(&pattern, handler.clone())
                .route(&subtree, handler)
        } else {
            router.route(&pattern, handler)
        };
    }

    Ok(router)
}
