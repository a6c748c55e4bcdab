//! HTTP server for test images
//!
//! Test images serve caller-supplied handlers and stop when the kubelet sends
//! SIGTERM:
//! - `listen_and_serve_gracefully` - one handler for every path
//! - `listen_and_serve_gracefully_with_pattern` - handler per path pattern
//!
//! `GracefulServer` exposes the same lifecycle step by step for callers that
//! need the bound address or their own shutdown trigger.

mod graceful;
mod routes;
pub mod shutdown;

pub use graceful::{
    listen_and_serve_gracefully, listen_and_serve_gracefully_with_pattern, GracefulServer,
    RunningServer, ServeError, ServerConfig, ServerState, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use routes::{build_router, single_handler, HandlerMap, ROOT_PATTERN};
pub use shutdown::{shutdown_channel, ShutdownController, ShutdownSignal, TerminationListener};

#[cfg(test)]
#[path = "graceful_test.rs"]
mod graceful_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
