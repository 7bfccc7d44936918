//! HTTP request handlers

use crate::api::server::AppContext;
use crate::error::Error;
use crate::queue::QueueSnapshot;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jukebox_common::events::QueueState;
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable kind
    pub error: String,
    pub message: String,
    /// A retry may succeed (player unreachable or slow)
    pub retryable: bool,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(kind: &str, message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: kind.to_string(),
            message: message.into(),
            retryable: false,
        }),
    )
}

/// Map a service error onto a status code and body
pub fn error_response(e: &Error) -> ApiError {
    let status = match e {
        Error::InvalidPosition(_) => StatusCode::BAD_REQUEST,
        Error::EmptyQueue => StatusCode::CONFLICT,
        Error::PlayerCommand(_) | Error::Search(_) => StatusCode::BAD_GATEWAY,
        Error::PlayerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Subscription(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Config(_) | Error::Http(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: e.kind().to_string(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }),
    )
}

/// Quoted entity tag for a snapshot
fn entity_tag(snapshot: &QueueSnapshot) -> String {
    format!("\"{}\"", snapshot.etag)
}

/// Does `If-None-Match` already name this version?
fn not_modified(headers: &HeaderMap, snapshot: &QueueSnapshot) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    value.split(',').map(str::trim).any(|tag| {
        tag == "*" || tag.trim_start_matches("W/").trim_matches('"') == snapshot.etag
    })
}

/// Track list body with its ETag header
fn snapshot_response(snapshot: &QueueSnapshot) -> Response {
    let mut response = Json::<QueueState>(snapshot.to_state()).into_response();
    if let Ok(value) = HeaderValue::from_str(&entity_tag(snapshot)) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "jukebox".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Track Endpoints
// ============================================================================

/// GET /tracks - Current track list
///
/// Answers 304 when the client's `If-None-Match` names the current version.
pub async fn get_tracks(State(ctx): State<AppContext>, headers: HeaderMap) -> Response {
    let snapshot = ctx.queue.snapshot();

    if not_modified(&headers, &snapshot) {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        if let Ok(value) = HeaderValue::from_str(&entity_tag(&snapshot)) {
            response.headers_mut().insert(header::ETAG, value);
        }
        return response;
    }

    snapshot_response(&snapshot)
}

/// POST /tracks - Search for the body text and append the first result
pub async fn add_track(
    State(ctx): State<AppContext>,
    body: String,
) -> Result<Response, ApiError> {
    let query = body.trim();
    if query.is_empty() {
        return Err(bad_request("invalid_query", "Search query must not be empty"));
    }

    info!("Add track request: {:?}", query);

    let track = ctx.finder.search(query).await.map_err(|e| {
        warn!("Search for {:?} failed: {}", query, e);
        error_response(&e)
    })?;

    match ctx.queue.add_track(track).await {
        Ok(snapshot) => Ok(snapshot_response(&snapshot)),
        Err(e) => {
            error!("Failed to add track: {}", e);
            Err(error_response(&e))
        }
    }
}

/// DELETE /tracks/:position - Remove a track
///
/// Only the playing track (position 0) can be removed; it is skipped on the player.
pub async fn remove_track(
    State(ctx): State<AppContext>,
    Path(position): Path<String>,
) -> Result<Response, ApiError> {
    let position: usize = position
        .parse()
        .map_err(|_| bad_request("invalid_position", format!("Not a track position: {}", position)))?;

    info!("Remove track request: {}", position);

    match ctx.queue.remove_track(position).await {
        Ok(snapshot) => Ok(snapshot_response(&snapshot)),
        Err(e) => {
            warn!("Failed to remove track {}: {}", position, e);
            Err(error_response(&e))
        }
    }
}
