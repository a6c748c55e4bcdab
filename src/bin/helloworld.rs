//! Hello world test image
//!
//! Answers every path with a fixed greeting and exits cleanly on SIGTERM.
//! Listens on `$PORT` (default 8080).

use serving_e2e::logging::init_tracing;
use serving_e2e::listen_and_serve_gracefully;
use tracing::info;

/// Port used when `PORT` is not set
const DEFAULT_PORT: &str = "8080";

/// Body the e2e tests assert on
const GREETING: &str = "Hello World! How about some tasty noodles?";

async fn hello() -> &'static str {
    info!("Hello world received a request");
    GREETING
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let port = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let addr = format!("0.0.0.0:{}", port);
    info!(address = %addr, "Hello world app started");

    listen_and_serve_gracefully(&addr, hello).await?;

    info!("Hello world app shut down gracefully");
    Ok(())
}
