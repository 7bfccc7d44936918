//! Server-Sent Events (SSE) utilities

use crate::events::QueueEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

/// Keep-alive comment interval for every SSE response
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Convert one queue event into an SSE frame
///
/// Returns None if the event cannot be serialized.
pub fn to_sse_event(event: &QueueEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => {
            debug!("Sending SSE event: {}", event.event_type());
            Some(Event::default().event(event.event_type()).data(json))
        }
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

/// Wrap a stream of queue events into an SSE response with keep-alive
pub fn queue_event_sse<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = QueueEvent> + Send + 'static,
{
    let stream = events.filter_map(|event| async move { to_sse_event(&event).map(Ok) });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
