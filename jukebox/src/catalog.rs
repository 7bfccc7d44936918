//! Track catalog
//!
//! Value objects for tracks found by the search provider and their binding to a
//! player slot. Tracks are shared as `Arc<Track>` and never modified after creation.

use crate::player::{SlotId, TrackMetadata};
use jukebox_common::events::TrackInfo;
use std::sync::Arc;

/// A playable track returned by the search provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Opaque id from the search provider
    pub id: String,
    pub title: String,
    /// Caption or thumbnail URL
    pub caption: String,
    pub tags: Vec<String>,
    /// URL handed to the player
    pub url: String,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        caption: impl Into<String>,
        tags: Vec<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            caption: caption.into(),
            tags,
            url: url.into(),
        }
    }

    /// Build a track for an entry the player already had (no search provider data)
    ///
    /// Returns None when the metadata has no URL to play.
    pub fn from_metadata(meta: &TrackMetadata) -> Option<Self> {
        let url = meta.url.clone()?;
        let id = meta
            .slot
            .as_ref()
            .map_or_else(|| url.clone(), |slot| slot.as_str().to_string());
        let title = meta.title.clone().unwrap_or_else(|| url.clone());
        Some(Self::new(id, title, String::new(), Vec::new(), url))
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.url == url
    }
}

/// A track in the local queue, bound to its player slot once known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTrack {
    track: Arc<Track>,
    slot: Option<SlotId>,
}

impl QueuedTrack {
    /// Unbound entry, as staged by an insert
    pub fn new(track: Arc<Track>) -> Self {
        Self { track, slot: None }
    }

    pub fn bound(track: Arc<Track>, slot: SlotId) -> Self {
        Self {
            track,
            slot: Some(slot),
        }
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    pub fn slot(&self) -> Option<&SlotId> {
        self.slot.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.slot.is_some()
    }

    /// Same entity as the player entry `slot`/`url`?
    ///
    /// Bound entries compare slots. Unbound entries fall back to the URL.
    pub fn matches(&self, slot: &SlotId, url: Option<&str>) -> bool {
        match &self.slot {
            Some(own) => own == slot,
            None => url.map_or(false, |url| self.track.matches_url(url)),
        }
    }

    /// Copy of this entry bound to `slot`
    pub fn with_slot(&self, slot: SlotId) -> Self {
        Self::bound(self.track.clone(), slot)
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.track.id.clone(),
            title: self.track.title.clone(),
            caption: self.track.caption.clone(),
            slot: self.slot.as_ref().map(|s| s.as_str().to_string()),
        }
    }
}
