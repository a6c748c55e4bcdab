//! Shutdown coordination for test image servers
//!
//! - `ShutdownController` / `ShutdownSignal` tell the serve task to stop
//!   accepting and drain in-flight requests
//! - `TerminationListener` waits for SIGTERM, which is how the kubelet asks
//!   a test image to stop

use tokio::sync::watch;
use tracing::info;

/// Receiving half of the shutdown channel
///
/// Cloned and handed to every task that has to stop on shutdown.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                // Controller dropped, nobody can trigger anymore
                break;
            }
        }
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Sending half of the shutdown channel
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
        info!("Shutdown signal sent");
    }

    /// Another receiver for the same channel
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Create a new shutdown signal pair
///
/// Dropping the controller counts as shutdown for every waiting signal.
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Registered listener for the process termination signal
///
/// Registration happens in `register`, so a signal delivered between
/// registering and calling `recv` is not lost.
pub struct TerminationListener {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl TerminationListener {
    /// Register for SIGTERM
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate())?;
        Ok(Self { sigterm })
    }

    /// Ctrl+C stands in for SIGTERM off unix
    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the termination signal, returning its name
    #[cfg(unix)]
    pub async fn recv(mut self) -> &'static str {
        self.sigterm.recv().await;
        info!("Received SIGTERM");
        "SIGTERM"
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C");
            return "CTRL_C_ERROR";
        }
        info!("Received Ctrl+C");
        "CTRL_C"
    }
}
