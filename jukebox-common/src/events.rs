//! Event types pushed to long-lived clients
//!
//! Events are serialized as JSON for SSE transmission. The `type` tag doubles as the
//! SSE event name.

use serde::{Deserialize, Serialize};

/// Client-facing view of one queued track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Search provider identity
    pub id: String,
    pub title: String,
    /// Caption or thumbnail URL
    pub caption: String,
    /// Player-assigned slot, absent until the player reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

/// Queue contents at one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Cache validation tag, unique per version
    pub etag: String,
    /// Monotonic version counter
    pub version: u64,
    /// Ordered tracks; the first one is playing
    pub tracks: Vec<TrackInfo>,
}

/// Jukebox event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    /// Queue contents changed
    ///
    /// Triggers:
    /// - SSE: Refresh every connected page
    QueueChanged {
        #[serde(flatten)]
        state: QueueState,
        /// When the change was committed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The service is shutting down; no further events follow
    Shutdown {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl QueueEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::QueueChanged { .. } => "QueueChanged",
            QueueEvent::Shutdown { .. } => "Shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_changed_serialization() {
        let event = QueueEvent::QueueChanged {
            state: QueueState {
                etag: "abc.1".to_string(),
                version: 1,
                tracks: vec![TrackInfo {
                    id: "dQw4w9WgXcQ".to_string(),
                    title: "Song".to_string(),
                    caption: "https://img/1.jpg".to_string(),
                    slot: None,
                }],
            },
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "QueueChanged");
        assert_eq!(json["etag"], "abc.1");
        assert_eq!(json["version"], 1);
        assert_eq!(json["tracks"][0]["title"], "Song");
        assert!(json["tracks"][0].get("slot").is_none());
        assert_eq!(event.event_type(), "QueueChanged");
    }
}
