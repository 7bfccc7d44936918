//! Immutable queue snapshots and version tokens

use crate::catalog::QueuedTrack;
use chrono::{DateTime, Utc};
use jukebox_common::events::{QueueEvent, QueueState};
use uuid::Uuid;

/// Queue contents at one committed version
///
/// Shared as `Arc<QueueSnapshot>`; never modified after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    /// Strictly increasing within one process
    pub version: u64,
    /// Cache validation tag: process instance id plus version
    pub etag: String,
    pub tracks: Vec<QueuedTrack>,
    pub committed_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Currently playing entry
    pub fn head(&self) -> Option<&QueuedTrack> {
        self.tracks.first()
    }

    pub fn to_state(&self) -> QueueState {
        QueueState {
            etag: self.etag.clone(),
            version: self.version,
            tracks: self.tracks.iter().map(QueuedTrack::info).collect(),
        }
    }

    pub fn to_event(&self) -> QueueEvent {
        QueueEvent::QueueChanged {
            state: self.to_state(),
            timestamp: self.committed_at,
        }
    }
}

/// Issues version tokens
///
/// The instance id keeps tags from repeating across restarts; the counter keeps them
/// from repeating within one.
#[derive(Debug)]
pub struct VersionSource {
    instance: String,
    next: u64,
}

impl VersionSource {
    pub fn new() -> Self {
        Self {
            instance: Uuid::new_v4().simple().to_string(),
            next: 0,
        }
    }

    /// Build the snapshot for the next version
    pub fn issue(&mut self, tracks: Vec<QueuedTrack>) -> QueueSnapshot {
        let version = self.next;
        self.next += 1;
        QueueSnapshot {
            version,
            etag: format!("{}.{}", self.instance, version),
            tracks,
            committed_at: Utc::now(),
        }
    }
}

impl Default for VersionSource {
    fn default() -> Self {
        Self::new()
    }
}
