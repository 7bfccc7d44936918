//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::queue::QueueManager;
use crate::search::TrackFinder;
use axum::{
    routing::{delete, get},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub queue: Arc<QueueManager>,
    pub finder: Arc<dyn TrackFinder>,
}

/// Build the router with every route and layer attached
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Track list and mutations
        .route(
            "/tracks",
            get(super::handlers::get_tracks).post(super::handlers::add_track),
        )
        .route("/tracks/:position", delete(super::handlers::remove_track))
        // SSE change stream
        .route("/changes", get(super::sse::change_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Pages are served from elsewhere
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
///
/// Open SSE streams keep the server alive until they end, so the queue manager must
/// be shut down (ending every subscription) for this to return.
pub async fn run<F>(
    address: String,
    port: u16,
    ctx: AppContext,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(ctx);

    let bind = format!("{}:{}", address, port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", bind, e)))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
