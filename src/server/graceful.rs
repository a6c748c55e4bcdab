//! HTTP server for test images with graceful shutdown
//!
//! Lifecycle: `Created -> Listening -> ShuttingDown -> Stopped`
//!
//! - `GracefulServer::new` builds the router (Created)
//! - `GracefulServer::start` binds and serves in a background task (Listening)
//! - `RunningServer::shutdown` stops accepting, drains in-flight requests
//!   and waits for the serve task (ShuttingDown, then Stopped)
//!
//! `listen_and_serve_gracefully*` wire the above to SIGTERM.

use super::routes::{build_router, single_handler, HandlerMap};
use super::shutdown::{shutdown_channel, ShutdownController, ShutdownSignal, TerminationListener};
use axum::handler::Handler;
use axum::routing::any;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use hyper_util::service::TowerToHyperService;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Grace period used by the SIGTERM-driven entry points
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid route pattern {0:?}: must start with '/' and contain no '{{', '}}' or '*'")]
    InvalidPattern(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register SIGTERM handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("server task failed: {0}")]
    Task(String),
}

/// Lifecycle state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Where to listen and how long shutdown may take
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address in `host:port` form
    pub addr: String,

    /// Upper bound on draining in-flight requests; `None` waits forever
    pub shutdown_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            shutdown_timeout: Some(DEFAULT_SHUTDOWN_TIMEOUT),
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// A server that has its routes but is not listening yet
pub struct GracefulServer {
    config: ServerConfig,
    router: Router,
    state: watch::Sender<ServerState>,
}

impl GracefulServer {
    /// Build the router for `handlers`
    ///
    /// Fails if any pattern cannot be routed.
    pub fn new(config: ServerConfig, handlers: HandlerMap) -> Result<Self, ServeError> {
        let router = build_router(handlers)?;
        let (state, _) = watch::channel(ServerState::Created);

        Ok(Self {
            config,
            router,
            state,
        })
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bind the address and start serving in a background task
    ///
    /// Returns only once the socket is bound, so bind failures reach the caller.
    pub async fn start(self) -> Result<RunningServer, ServeError> {
        let listener = TcpListener::bind(self.config.addr.as_str())
            .await
            .map_err(|source| ServeError::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServeError::Serve)?;

        let (controller, signal) = shutdown_channel();
        let handle = tokio::spawn(serve_connections(listener, self.router, signal));

        self.state.send_replace(ServerState::Listening);
        info!(address = %local_addr, "Test server listening (HTTP)");

        Ok(RunningServer {
            local_addr,
            shutdown_timeout: self.config.shutdown_timeout,
            controller,
            handle,
            state: self.state,
        })
    }
}

/// Accept loop of a running server
///
/// Every connection runs in a task owned by this future. Once `signal`
/// fires the listener is closed and each connection is asked to finish its
/// current request; dropping this future drops every connection with it.
async fn serve_connections(
    listener: TcpListener,
    router: Router,
    mut signal: ShutdownSignal,
) -> std::io::Result<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                debug!(remote = %remote, "Accepted connection");
                connections.spawn(serve_connection(stream, router.clone(), signal.clone()));
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = signal.wait() => break,
        }
    }

    drop(listener);
    debug!(open = connections.len(), "Listener closed, draining connections");
    while connections.join_next().await.is_some() {}

    Ok(())
}

/// Serve one HTTP connection, shutting it down gracefully on `signal`
async fn serve_connection(stream: TcpStream, router: Router, mut signal: ShutdownSignal) {
    let builder = ConnectionBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = signal.wait() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(error = %e, "Connection closed with error");
    }
}

/// A listening server
///
/// Dropping it without calling `shutdown` still stops the listener, but
/// nothing waits for in-flight requests.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown_timeout: Option<Duration>,
    controller: ShutdownController,
    handle: JoinHandle<std::io::Result<()>>,
    state: watch::Sender<ServerState>,
}

impl RunningServer {
    /// Address the listener is bound to (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Stop accepting connections and wait for in-flight requests
    ///
    /// With a shutdown timeout set, connections still open when it expires
    /// are dropped (their clients see the connection close without a
    /// response) and `ServeError::ShutdownTimeout` is returned.
    pub async fn shutdown(self) -> Result<(), ServeError> {
        self.state.send_replace(ServerState::ShuttingDown);
        info!(address = %self.local_addr, "Shutting down test server");
        self.controller.shutdown();

        let mut handle = self.handle;
        let joined = match self.shutdown_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout = ?timeout, "Graceful shutdown timed out, dropping open connections");
                    handle.abort();
                    let _ = handle.await;
                    self.state.send_replace(ServerState::Stopped);
                    return Err(ServeError::ShutdownTimeout(timeout));
                }
            },
            None => handle.await,
        };

        self.state.send_replace(ServerState::Stopped);
        info!(address = %self.local_addr, "Test server stopped");

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServeError::Serve(e)),
            Err(e) => Err(ServeError::Task(e.to_string())),
        }
    }

    /// Serve until `signal` completes, then shut down
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await
    }
}

/// Serve `handler` on `/` (and every path below it) until SIGTERM
pub async fn listen_and_serve_gracefully<H, T>(addr: &str, handler: H) -> Result<(), ServeError>
where
    H: Handler<T, ()>,
    T: 'static,
{
    listen_and_serve_gracefully_with_pattern(addr, single_handler(any(handler))).await
}

/// Serve `handlers` on `addr` until SIGTERM, then shut down gracefully
///
/// Blocks until the server has stopped. The SIGTERM handler is registered
/// before binding, so a signal sent once the server answers is never missed.
pub async fn listen_and_serve_gracefully_with_pattern(
    addr: &str,
    handlers: HandlerMap,
) -> Result<(), ServeError> {
    let server = GracefulServer::new(ServerConfig::new(addr), handlers)?;
    let sigterm = TerminationListener::register().map_err(ServeError::Signal)?;
    let running = server.start().await?;

    let result = running
        .run_until(async move {
            let signal = sigterm.recv().await;
            info!(signal = signal, "Initiating graceful shutdown");
        })
        .await;

    if let Err(e) = &result {
        warn!(error = %e, "Test server did not shut down cleanly");
    }
    result
}
