//! Support library for serving end-to-end tests
//!
//! - `resource` - log Kubernetes resource objects as JSON for traceability
//! - `image` - build fully qualified test image references
//! - `server` - HTTP server for test images with graceful SIGTERM shutdown
//! - `probe` - wait for an HTTP endpoint to start answering

pub mod config;
pub mod image;
pub mod logging;
pub mod probe;
pub mod resource;
pub mod server;

pub use config::ServingFlags;
pub use image::image_path;
pub use logging::{Logger, TracingLogger};
pub use resource::{log_resource_object, ResourceObjects};
pub use server::{listen_and_serve_gracefully, listen_and_serve_gracefully_with_pattern};
