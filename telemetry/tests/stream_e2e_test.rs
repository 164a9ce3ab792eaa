//! End-to-end tests against an in-process crawler API
//!
//! Serves the frame stream and the pull endpoints with axum on an ephemeral
//! port and opens real run views against it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{CreateRunRequest, RunId, StopReason};
use tokio::net::TcpListener;
use tokio::time::timeout;

use crawl_telemetry::{
    ApiClient, ApiError, ConnectionStatus, RunView, RunViewHandle, RunViewSnapshot,
    TelemetryConfig,
};

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    last_event_ids: Mutex<Vec<Option<String>>>,
    page_limits: Mutex<Vec<usize>>,
    /// Close the stream after each batch instead of holding it open
    close_after_batch: bool,
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TestServer {
    fn config(&self) -> TelemetryConfig {
        TelemetryConfig {
            poll_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(50),
            ..TelemetryConfig::default()
        }
        .with_api_base(format!("http://{}/", self.addr))
    }
}

fn frame(seq: usize) -> Value {
    json!({
        "ts": "2026-03-01T12:00:00Z",
        "throughput": { "pages_per_sec": seq as f64 },
        "queues": { "frontier": 100 + seq, "fetch": 3, "parse": 1 },
        "errors": null,
        "hosts": null,
        "graph_delta": {
            "nodes": [format!("h{seq}.example")],
            "edges": [["seed.example", format!("h{seq}.example"), 1]]
        }
    })
}

async fn events(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let connection = state.connections.fetch_add(1, Ordering::SeqCst);
    match id.as_str() {
        "finished" => return StatusCode::NO_CONTENT.into_response(),
        "missing" => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "run not active" })),
            )
                .into_response()
        }
        _ => {}
    }
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .last_event_ids
        .lock()
        .expect("lock poisoned")
        .push(last_event_id);

    let first = connection * 2 + 1;
    let batch: Vec<Result<Event, Infallible>> = vec![
        Ok(Event::default().comment("hello")),
        Ok(Event::default()
            .event("frame")
            .id(first.to_string())
            .retry(Duration::from_millis(50))
            .data(frame(first).to_string())),
        Ok(Event::default()
            .event("frame")
            .id((first + 1).to_string())
            .data(frame(first + 1).to_string())),
    ];

    let stream = stream::iter(batch);
    let stream = if state.close_after_batch {
        stream.boxed()
    } else {
        stream.chain(stream::pending()).boxed()
    };
    Sse::new(stream).into_response()
}

async fn get_run(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "id": id,
        "status": "running",
        "created_at": "2026-03-01T11:59:00Z",
        "started_at": "2026-03-01T11:59:01Z",
        "storage_mode": "postgres",
        "stop_reason": "",
        "limits": { "max_depth": 3, "max_pages": 500, "time_budget_seconds": 300 },
        "summary": { "pages_fetched": 7, "pages_failed": 0, "unique_hosts": 2, "total_bytes": 9000 }
    }))
}

#[derive(Deserialize)]
struct PagesQuery {
    limit: Option<usize>,
}

async fn list_pages(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<PagesQuery>,
) -> Json<Value> {
    state
        .page_limits
        .lock()
        .expect("lock poisoned")
        .push(query.limit.unwrap_or_default());
    Json(json!({ "items": [{
        "url": "https://seed.example/",
        "host": "seed.example",
        "depth": 0,
        "status_code": 200,
        "content_type": "text/html",
        "fetch_ms": 31,
        "size_bytes": 2048,
        "fetched_at": "2026-03-01T12:00:00Z"
    }] }))
}

async fn create_run(Json(body): Json<Value>) -> impl IntoResponse {
    let seed = body.get("seed_url").and_then(Value::as_str).unwrap_or("");
    if body.get("max_pages").is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "max_pages must be positive" })),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({ "id": format!("run-for-{}", seed.len()), "status": "created" })),
    )
}

async fn start_run(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({ "status": "running" }))
}

async fn stop_run(Path(_id): Path<String>) -> impl IntoResponse {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": "run not running" })),
    )
}

async fn start_test_server(close_after_batch: bool) -> TestServer {
    let state = Arc::new(ServerState {
        close_after_batch,
        ..ServerState::default()
    });

    let app = Router::new()
        .route("/runs", post(create_run))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/start", post(start_run))
        .route("/runs/{id}/stop", post(stop_run))
        .route("/runs/{id}/pages", get(list_pages))
        .route("/runs/{id}/events", get(events))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestServer {
        addr,
        state,
        handle,
    }
}

async fn wait_for_snapshot(
    view: &RunViewHandle,
    what: &str,
    ready: impl Fn(&RunViewSnapshot) -> bool,
) -> RunViewSnapshot {
    timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = view.snapshot().await.expect("snapshot failed");
            if ready(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {what}"))
}

#[tokio::test]
async fn test_view_streams_frames_and_polls_snapshots() {
    let server = start_test_server(false).await;
    let view = RunView::open(&server.config(), RunId::from("run-1"))
        .await
        .expect("Failed to open view");

    let snapshot = wait_for_snapshot(&view, "two frames and a poll", |s| {
        s.frames_applied() == 2 && s.run().is_some() && !s.pages().is_empty()
    })
    .await;

    assert_eq!(snapshot.status(), ConnectionStatus::Live);
    assert_eq!(snapshot.throughput(), vec![1.0, 2.0]);
    assert!(snapshot.errors().is_empty());
    assert_eq!(snapshot.graph().node_count(), 2);
    assert_eq!(snapshot.graph().edge("seed.example", "h1.example"), Some(1));
    assert_eq!(snapshot.effective_stop_reason(), Some(StopReason::Running));
    assert!(snapshot.storage_is_durable());
    assert_eq!(snapshot.pages()[0].host, "seed.example");
    assert!(server
        .state
        .page_limits
        .lock()
        .expect("lock poisoned")
        .iter()
        .all(|limit| *limit == 50));

    view.close().await;
}

#[tokio::test]
async fn test_view_reconnects_with_last_event_id() {
    let server = start_test_server(true).await;
    let view = RunView::open(&server.config(), RunId::from("run-1"))
        .await
        .expect("Failed to open view");

    let snapshot = wait_for_snapshot(&view, "frames from a second connection", |s| {
        s.frames_applied() >= 4
    })
    .await;
    assert_eq!(snapshot.throughput()[..4], [1.0, 2.0, 3.0, 4.0]);
    assert!(snapshot.graph().contains_node("h4.example"));

    let ids = server
        .state
        .last_event_ids
        .lock()
        .expect("lock poisoned")
        .clone();
    assert!(ids.len() >= 2);
    assert_eq!(ids[0], None);
    assert_eq!(ids[1].as_deref(), Some("2"));

    view.close().await;
}

#[tokio::test]
async fn test_missing_stream_reports_reconnecting() {
    let server = start_test_server(false).await;
    let config = TelemetryConfig {
        stream_client_error_retries: u32::MAX,
        ..server.config()
    }
    .with_api_base(format!("http://{}/nope", server.addr));
    let view = RunView::open(&config, RunId::from("run-1"))
        .await
        .expect("Failed to open view");

    let snapshot = wait_for_snapshot(&view, "a reconnecting status", |s| {
        s.status() == ConnectionStatus::Reconnecting
    })
    .await;
    assert_eq!(snapshot.frames_applied(), 0);
    assert!(snapshot.run().is_none());
    assert!(!snapshot.storage_is_durable());

    view.close().await;
}

#[tokio::test]
async fn test_no_content_ends_the_stream() {
    let server = start_test_server(false).await;
    let view = RunView::open(&server.config(), RunId::from("finished"))
        .await
        .expect("Failed to open view");

    let snapshot = wait_for_snapshot(&view, "an error status", |s| {
        s.status() == ConnectionStatus::Error
    })
    .await;
    assert_eq!(snapshot.frames_applied(), 0);
    assert_eq!(snapshot.frames_rejected(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.state.connections.load(Ordering::SeqCst), 1);
    assert_eq!(view.status().await.unwrap(), ConnectionStatus::Error);

    view.close().await;
}

#[tokio::test]
async fn test_rejected_stream_gives_up_after_retries() {
    let server = start_test_server(false).await;
    let config = TelemetryConfig {
        stream_client_error_retries: 2,
        ..server.config()
    };
    let view = RunView::open(&config, RunId::from("missing"))
        .await
        .expect("Failed to open view");

    wait_for_snapshot(&view, "an error status", |s| {
        s.status() == ConnectionStatus::Error
    })
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.state.connections.load(Ordering::SeqCst), 3);
    assert_eq!(view.status().await.unwrap(), ConnectionStatus::Error);

    view.close().await;
}

#[tokio::test]
async fn test_close_releases_the_stream() {
    let server = start_test_server(false).await;
    let view = RunView::open(&server.config(), RunId::from("run-1"))
        .await
        .expect("Failed to open view");
    wait_for_snapshot(&view, "first frame", |s| s.frames_applied() > 0).await;

    view.close().await;

    let connections = server.state.connections.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.state.connections.load(Ordering::SeqCst), connections);
}

#[tokio::test]
async fn test_api_client_surfaces_server_errors() {
    let server = start_test_server(false).await;
    let client = ApiClient::new(&server.config()).expect("Failed to build client");

    let created = client
        .create_run(&CreateRunRequest::new("https://seed.example"))
        .await
        .expect("create failed");
    assert_eq!(created.status, "created");
    let started = client.start_run(&created.id).await.expect("start failed");
    assert_eq!(started.status, "running");

    let mut request = CreateRunRequest::new("https://seed.example");
    request.max_pages = Some(0);
    let err = client.create_run(&request).await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Http {
            status: 400,
            message: "max_pages must be positive".to_string()
        }
    );

    let err = client.stop_run(&created.id).await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP error: 409 (run not running)");

    let err = client
        .create_run(&CreateRunRequest::new("not a url"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let pages = client
        .list_pages(&RunId::from("run-1"), 10_000)
        .await
        .expect("list pages failed");
    assert_eq!(pages.len(), 1);
    assert_eq!(
        server.state.page_limits.lock().expect("lock poisoned").last(),
        Some(&500)
    );
}
