//! Log sink used by the e2e helpers
//!
//! Production code uses `TracingLogger`, which emits `tracing` events tagged
//! with the test name. Tests use `MockLogger` to capture lines in memory.

use tracing::info;

/// Sink for informational log lines
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
}

/// Logger that forwards lines to `tracing` at INFO level
#[derive(Debug, Clone)]
pub struct TracingLogger {
    name: String,
}

impl TracingLogger {
    /// Create a logger whose lines carry `name` (usually the test name)
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        info!(logger = %self.name, "{}", message);
    }
}

/// Install the global `tracing` subscriber
///
/// Filter comes from `RUST_LOG`, falling back to `info`. Returns false if a
/// subscriber was already installed, so calling this from every test is fine.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .is_ok()
}

/// Mock logger for testing - stores lines in memory
#[cfg(test)]
#[allow(clippy::expect_used)]
#[derive(Default)]
pub struct MockLogger {
    lines: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("MockLogger lock poisoned").clone()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Logger for MockLogger {
    fn info(&self, message: &str) {
        self.lines
            .lock()
            .expect("MockLogger lock poisoned")
            .push(message.to_string());
    }
}
