//! Integration tests for the jukebox HTTP API
//!
//! Tests the complete API surface:
//! - Health check
//! - Track list with ETag validation
//! - Adding and removing tracks
//! - Structured error bodies

mod helpers;

use axum::body::Body;
use axum::http::StatusCode;
use helpers::{track, FixedFinder, Harness};
use http::{header, Method, Request};
use jukebox::api::{build_router, AppContext};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Test helper to create a router over a loopback harness
fn setup_test_server(finder: FixedFinder) -> (axum::Router, Harness) {
    let h = Harness::new();
    let ctx = AppContext {
        queue: h.queue.clone(),
        finder: Arc::new(finder),
    };
    (build_router(ctx), h)
}

fn finder() -> FixedFinder {
    FixedFinder::default()
        .with("hobbits", track("isengard"))
        .with("rick", track("dQw4w9WgXcQ"))
}

/// Helper function to make HTTP requests to the test router
async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<&str>,
    if_none_match: Option<&str>,
) -> (StatusCode, Option<String>, Option<Value>) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(tag) = if_none_match {
        request = request.header(header::IF_NONE_MATCH, tag);
    }
    let request = match body {
        Some(text) => request
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(text.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let etag = response
        .headers()
        .get(header::ETAG)
        .map(|v| v.to_str().unwrap().to_string());

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).unwrap())
    };

    (status, etag, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _h) = setup_test_server(finder());

    let (status, _, body) = make_request(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "jukebox");
}

#[tokio::test]
async fn test_empty_track_list() {
    let (app, _h) = setup_test_server(finder());

    let (status, etag, body) = make_request(&app, Method::GET, "/tracks", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["version"], 0);
    assert_eq!(body["tracks"].as_array().unwrap().len(), 0);
    assert_eq!(etag.unwrap(), format!("\"{}\"", body["etag"].as_str().unwrap()));
}

#[tokio::test]
async fn test_add_track_by_search() {
    let (app, h) = setup_test_server(finder());

    let (status, etag, body) =
        make_request(&app, Method::POST, "/tracks", Some("  hobbits\n"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(etag.is_some());
    let body = body.unwrap();
    assert_eq!(body["version"], 1);
    assert_eq!(body["tracks"][0]["id"], "isengard");
    assert_eq!(body["tracks"][0]["title"], "Title isengard");
    assert_eq!(body["tracks"][0]["caption"], "https://img/isengard.jpg");
    assert_eq!(
        body["tracks"][0]["slot"].as_str(),
        Some(h.player.slots()[0].as_str())
    );
}

#[tokio::test]
async fn test_if_none_match_returns_not_modified() {
    let (app, _h) = setup_test_server(finder());
    make_request(&app, Method::POST, "/tracks", Some("hobbits"), None).await;

    let (_, etag, _) = make_request(&app, Method::GET, "/tracks", None, None).await;
    let etag = etag.unwrap();

    let (status, same, body) =
        make_request(&app, Method::GET, "/tracks", None, Some(&etag)).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert_eq!(same.as_deref(), Some(etag.as_str()));
    assert!(body.is_none());

    // Any mutation invalidates the tag
    make_request(&app, Method::POST, "/tracks", Some("rick"), None).await;
    let (status, fresh, _) = make_request(&app, Method::GET, "/tracks", None, Some(&etag)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(fresh.unwrap(), etag);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let (app, h) = setup_test_server(finder());

    let (status, _, body) = make_request(&app, Method::POST, "/tracks", Some("   "), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "invalid_query");
    assert!(h.player.commands().is_empty());
}

#[tokio::test]
async fn test_search_failure_is_reported() {
    let (app, h) = setup_test_server(finder());

    let (status, _, body) =
        make_request(&app, Method::POST, "/tracks", Some("nothing"), None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let body = body.unwrap();
    assert_eq!(body["error"], "search");
    assert_eq!(body["retryable"], false);
    assert_eq!(h.queue.snapshot().version, 0);
}

#[tokio::test]
async fn test_player_failure_is_retryable() {
    let (app, h) = setup_test_server(finder());
    h.player.fail_next_command("busy");

    let (status, _, body) =
        make_request(&app, Method::POST, "/tracks", Some("hobbits"), None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let body = body.unwrap();
    assert_eq!(body["error"], "player_command");
    assert_eq!(body["retryable"], true);
    assert!(h.queue.snapshot().is_empty());
}

#[tokio::test]
async fn test_remove_playing_track() {
    let (app, h) = setup_test_server(finder());
    make_request(&app, Method::POST, "/tracks", Some("hobbits"), None).await;
    make_request(&app, Method::POST, "/tracks", Some("rick"), None).await;

    let (status, _, body) = make_request(&app, Method::DELETE, "/tracks/0", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["tracks"].as_array().unwrap().len(), 1);
    assert_eq!(body["tracks"][0]["id"], "dQw4w9WgXcQ");
    assert_eq!(h.player.next_count(), 1);
}

#[tokio::test]
async fn test_remove_errors() {
    let (app, _h) = setup_test_server(finder());

    let (status, _, body) = make_request(&app, Method::DELETE, "/tracks/0", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.unwrap()["error"], "empty_queue");

    make_request(&app, Method::POST, "/tracks", Some("hobbits"), None).await;

    let (status, _, body) = make_request(&app, Method::DELETE, "/tracks/1", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "invalid_position");

    let (status, _, body) =
        make_request(&app, Method::DELETE, "/tracks/first", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "invalid_position");
}

#[tokio::test]
async fn test_change_stream_headers() {
    let (app, h) = setup_test_server(finder());

    let request = Request::builder()
        .method(Method::GET)
        .uri("/changes")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    // Ending the stream lets the whole body be read
    h.queue.shutdown().await;
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event: QueueChanged"));
    assert!(text.contains("event: Shutdown"));
}
