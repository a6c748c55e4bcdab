//! Tests for the graceful test image server

use super::*;
use crate::probe::{wait_for_endpoint, ProbeConfig};
use axum::routing::{any, get};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;

const LOCALHOST: &str = "127.0.0.1:0";

/// Start a server on an ephemeral port and wait until it answers
async fn start_server(
    config: ServerConfig,
    handlers: HandlerMap,
) -> (RunningServer, reqwest::Client) {
    let server = GracefulServer::new(config, handlers).expect("valid handlers");
    let running = server.start().await.expect("server should bind");

    let client = reqwest::Client::new();
    wait_for_endpoint(
        &client,
        &format!("http://{}/", running.local_addr()),
        &ProbeConfig::default(),
    )
    .await
    .expect("server should answer");

    (running, client)
}

/// Handler that counts its calls and answers with `body`
fn counting(counter: Arc<AtomicUsize>, body: &'static str) -> axum::routing::MethodRouter {
    any(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            body
        }
    })
}

async fn get_text(client: &reqwest::Client, url: String) -> (u16, String) {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("request should succeed");
    let status = response.status().as_u16();
    (status, response.text().await.expect("body"))
}

#[tokio::test]
async fn test_start_transitions_created_to_listening() {
    let server = GracefulServer::new(
        ServerConfig::new(LOCALHOST),
        single_handler(get(|| async { "ok" })),
    )
    .expect("valid handlers");
    assert_eq!(server.state(), ServerState::Created);

    let running = server.start().await.expect("server should bind");
    assert_eq!(running.state(), ServerState::Listening);
    assert_ne!(running.local_addr().port(), 0, "port 0 should be resolved");

    let states = running.subscribe();
    running.shutdown().await.expect("clean shutdown");
    assert_eq!(*states.borrow(), ServerState::Stopped);
}

#[tokio::test]
async fn test_patterns_dispatch_independently() {
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let handlers = HashMap::from([
        ("/a".to_string(), counting(a_calls.clone(), "a")),
        ("/b".to_string(), counting(b_calls.clone(), "b")),
    ]);
    let (running, client) = start_server(ServerConfig::new(LOCALHOST), handlers).await;
    let base = format!("http://{}", running.local_addr());

    // The readiness probe hit "/", which neither pattern claims
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);

    let (status, body) = get_text(&client, format!("{}/a", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body, "a");
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0, "/a must not reach handler b");

    let (status, _) = get_text(&client, format!("{}/c", base)).await;
    assert_eq!(status, 404, "unclaimed path should be 404");

    running.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_single_handler_serves_every_path() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (running, client) = start_server(
        ServerConfig::new(LOCALHOST),
        single_handler(counting(calls.clone(), "root")),
    )
    .await;
    let base = format!("http://{}", running.local_addr());
    let before = calls.load(Ordering::SeqCst);

    for path in ["/", "/healthz", "/deeply/nested/path"] {
        let (status, body) = get_text(&client, format!("{}{}", base, path)).await;
        assert_eq!(status, 200, "{path} should reach the root handler");
        assert_eq!(body, "root");
    }
    assert_eq!(calls.load(Ordering::SeqCst), before + 3);

    running.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_subtree_pattern_wins_over_root() {
    let handlers = HashMap::from([
        ("/".to_string(), get(|| async { "root" })),
        ("/static/".to_string(), get(|| async { "static" })),
        ("/healthz".to_string(), get(|| async { "healthy" })),
    ]);
    let (running, client) = start_server(ServerConfig::new(LOCALHOST), handlers).await;
    let base = format!("http://{}", running.local_addr());

    let cases = [
        ("/static/", "static"),
        ("/static/css/site.css", "static"),
        ("/healthz", "healthy"),
        ("/other", "root"),
        ("/", "root"),
    ];
    for (path, expected) in cases {
        let (status, body) = get_text(&client, format!("{}{}", base, path)).await;
        assert_eq!(status, 200);
        assert_eq!(body, expected, "wrong handler for {path}");
    }

    running.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_nested_subtrees_pick_most_specific() {
    let handlers = HashMap::from([
        ("/a/".to_string(), get(|| async { "a" })),
        ("/a/b/".to_string(), get(|| async { "ab" })),
        ("/exact".to_string(), get(|| async { "exact" })),
    ]);
    let (running, client) = start_server(ServerConfig::new(LOCALHOST), handlers).await;
    let base = format!("http://{}", running.local_addr());

    let cases = [
        ("/a/b/c", 200, "ab"),
        ("/a/b/", 200, "ab"),
        ("/a/x", 200, "a"),
        ("/a/", 200, "a"),
        ("/exact", 200, "exact"),
    ];
    for (path, expected_status, expected) in cases {
        let (status, body) = get_text(&client, format!("{}{}", base, path)).await;
        assert_eq!(status, expected_status, "wrong status for {path}");
        assert_eq!(body, expected, "wrong handler for {path}");
    }

    let (status, _) = get_text(&client, format!("{}/exact/x", base)).await;
    assert_eq!(status, 404, "exact pattern must not claim paths below it");

    running.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_colon_segment_matches_literally() {
    let handlers = HashMap::from([
        ("/:id".to_string(), get(|| async { "literal" })),
        ("/v1/:name/".to_string(), get(|| async { "subtree" })),
    ]);
    let (running, client) = start_server(ServerConfig::new(LOCALHOST), handlers).await;
    let base = format!("http://{}", running.local_addr());

    let (status, body) = get_text(&client, format!("{}/:id", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body, "literal");

    let (status, body) = get_text(&client, format!("{}/v1/:name/x", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body, "subtree");

    let (status, _) = get_text(&client, format!("{}/123", base)).await;
    assert_eq!(status, 404, "`:id` is not a capture");

    running.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_listener_unreachable_after_shutdown() {
    let (running, _client) = start_server(
        ServerConfig::new(LOCALHOST),
        single_handler(get(|| async { "ok" })),
    )
    .await;
    let addr = running.local_addr();

    running.shutdown().await.expect("clean shutdown");

    assert!(
        TcpStream::connect(addr).await.is_err(),
        "listening socket should be closed after shutdown"
    );
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_request() {
    let entered = Arc::new(Notify::new());
    let handler_entered = entered.clone();
    let handlers = HashMap::from([
        ("/".to_string(), get(|| async { "ok" })),
        (
            "/slow".to_string(),
            get(move || {
                let entered = handler_entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "done"
                }
            }),
        ),
    ]);
    let (running, client) = start_server(ServerConfig::new(LOCALHOST), handlers).await;
    let url = format!("http://{}/slow", running.local_addr());

    let in_flight = tokio::spawn(async move { get_text(&client, url).await });
    entered.notified().await;

    running.shutdown().await.expect("clean shutdown");

    let (status, body) = in_flight.await.expect("request task");
    assert_eq!(status, 200);
    assert_eq!(body, "done", "in-flight request should complete");
}

#[tokio::test]
async fn test_shutdown_timeout_drops_stuck_request() {
    let entered = Arc::new(Notify::new());
    let completed = Arc::new(AtomicUsize::new(0));
    let handler_entered = entered.clone();
    let handler_completed = completed.clone();
    let handlers = HashMap::from([
        ("/".to_string(), get(|| async { "ok" })),
        (
            "/stuck".to_string(),
            get(move || {
                let entered = handler_entered.clone();
                let completed = handler_completed.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_millis(600)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    "late"
                }
            }),
        ),
    ]);
    let timeout = Duration::from_millis(100);
    let config = ServerConfig::new(LOCALHOST).with_shutdown_timeout(Some(timeout));
    let (running, client) = start_server(config, handlers).await;
    let url = format!("http://{}/stuck", running.local_addr());

    let stuck = tokio::spawn(async move {
        client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
    });
    entered.notified().await;

    let states = running.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(5), running.shutdown())
        .await
        .expect("shutdown should respect its deadline");

    assert!(matches!(result, Err(ServeError::ShutdownTimeout(t)) if t == timeout));
    assert_eq!(*states.borrow(), ServerState::Stopped);

    let response = stuck.await.expect("request task");
    assert!(
        response.is_err(),
        "connection should be dropped at the deadline, got {:?}",
        response.map(|r| r.status())
    );

    // Past the point where the handler would have finished
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 0, "handler should not run to completion");
}

#[tokio::test]
async fn test_start_reports_address_in_use() {
    let taken = tokio::net::TcpListener::bind(LOCALHOST)
        .await
        .expect("bind ephemeral port");
    let addr = taken.local_addr().expect("local addr").to_string();

    let server = GracefulServer::new(
        ServerConfig::new(addr.clone()),
        single_handler(get(|| async { "ok" })),
    )
    .expect("valid handlers");

    match server.start().await {
        Err(ServeError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        Err(e) => panic!("expected bind error, got {}", e),
        Ok(_) => panic!("second bind on {} should fail", addr),
    }
}

#[tokio::test]
async fn test_start_reports_unresolvable_address() {
    let server = GracefulServer::new(
        ServerConfig::new("not-an-address"),
        single_handler(get(|| async { "ok" })),
    )
    .expect("valid handlers");

    assert!(matches!(
        server.start().await,
        Err(ServeError::Bind { .. })
    ));
}

#[test]
fn test_new_rejects_invalid_pattern() {
    let handlers = HashMap::from([("healthz".to_string(), get(|| async { "ok" }))]);

    let err = GracefulServer::new(ServerConfig::new(LOCALHOST), handlers)
        .err()
        .expect("pattern without leading slash should be rejected");

    assert!(matches!(err, ServeError::InvalidPattern(ref p) if p == "healthz"));
}

#[tokio::test]
async fn test_run_until_shuts_down_when_signal_fires() {
    let (running, _client) = start_server(
        ServerConfig::new(LOCALHOST),
        single_handler(get(|| async { "ok" })),
    )
    .await;
    let addr = running.local_addr();
    let (trigger, mut signal) = shutdown_channel();

    let serving = tokio::spawn(running.run_until(async move { signal.wait().await }));
    trigger.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("run_until should return after the signal")
        .expect("task should not panic");
    assert!(result.is_ok());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[test]
fn test_server_config_defaults_to_bounded_shutdown() {
    let config = ServerConfig::new("0.0.0.0:8080");

    assert_eq!(config.shutdown_timeout, Some(DEFAULT_SHUTDOWN_TIMEOUT));
    assert_eq!(config.with_shutdown_timeout(None).shutdown_timeout, None);
}
