//! Server-Sent Events change stream

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::debug;

/// GET /changes - queue change stream
///
/// Starts with the current state so a client never needs a separate fetch, then sends
/// one `QueueChanged` per committed version in commit order.
pub async fn change_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");
    jukebox_common::sse::queue_event_sse(ctx.queue.events())
}
