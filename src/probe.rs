//! Endpoint readiness probing
//!
//! Polls a URL until the server behind it answers. Any HTTP response counts
//! as an answer; only connection-level failures are retried.

use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{url} not ready after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
}

/// Retry schedule for `wait_for_endpoint`
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Total attempts, including the first one
    pub max_retries: u32,
    /// Delay after the first failure, doubled after each subsequent one
    pub initial_delay: Duration,
    /// Cap on the delay between attempts
    pub max_delay: Duration,
    /// Timeout of a single attempt
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            request_timeout: Duration::from_millis(100),
        }
    }
}

/// GET `url` until it answers, backing off exponentially between attempts
pub async fn wait_for_endpoint(
    client: &Client,
    url: &str,
    config: &ProbeConfig,
) -> Result<Response, ProbeError> {
    let attempts = config.max_retries.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match client
            .get(url)
            .timeout(config.request_timeout)
            .send()
            .await
        {
            Ok(response) => {
                debug!(url = %url, attempt, status = %response.status(), "Endpoint answered");
                return Ok(response);
            }
            Err(e) if attempt < attempts => {
                debug!(url = %url, attempt, error = %e, "Endpoint not ready, retrying");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, config.max_delay);
                attempt += 1;
            }
            Err(source) => {
                return Err(ProbeError::Exhausted {
                    url: url.to_string(),
                    attempts,
                    source,
                })
            }
        }
    }
}
