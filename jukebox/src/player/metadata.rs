//! Typed views of player properties

use super::types::{BackendError, PropertyValue, SlotId};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key holding the track list slot
pub const KEY_TRACK_ID: &str = "mpris:trackid";
/// Metadata key holding the playable URL
pub const KEY_URL: &str = "xesam:url";
/// Metadata key holding the title
pub const KEY_TITLE: &str = "xesam:title";
/// Metadata key holding the length in microseconds
pub const KEY_LENGTH: &str = "mpris:length";

/// Player.PlaybackStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
        }
    }

    pub fn from_value(value: &PropertyValue) -> Result<Self, BackendError> {
        match value.as_str() {
            Some("Playing") => Ok(PlaybackStatus::Playing),
            Some("Paused") => Ok(PlaybackStatus::Paused),
            Some("Stopped") => Ok(PlaybackStatus::Stopped),
            _ => Err(BackendError::Malformed(format!(
                "PlaybackStatus {:?}",
                value
            ))),
        }
    }

    pub fn to_value(self) -> PropertyValue {
        PropertyValue::Str(self.as_str().to_string())
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player.Metadata of one track
///
/// Network streams report no length until they start buffering, so every field is
/// optional. A missing slot (or the `NoTrack` path) means nothing is loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub slot: Option<SlotId>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub length_us: Option<i64>,
}

impl TrackMetadata {
    pub fn from_value(value: &PropertyValue) -> Result<Self, BackendError> {
        let map = value
            .as_dict()
            .ok_or_else(|| BackendError::Malformed(format!("Metadata {:?}", value)))?;
        Ok(Self::from_map(map))
    }

    pub fn from_map(map: &BTreeMap<String, PropertyValue>) -> Self {
        let slot = map
            .get(KEY_TRACK_ID)
            .and_then(PropertyValue::as_str)
            .map(SlotId::new)
            .filter(|slot| !slot.is_no_track());

        Self {
            slot,
            url: map.get(KEY_URL).and_then(PropertyValue::as_str).map(str::to_string),
            title: map.get(KEY_TITLE).and_then(PropertyValue::as_str).map(str::to_string),
            length_us: map.get(KEY_LENGTH).and_then(PropertyValue::as_i64),
        }
    }

    pub fn to_value(&self) -> PropertyValue {
        let mut map = BTreeMap::new();
        let slot = self
            .slot
            .as_ref()
            .map_or(super::types::NO_TRACK.to_string(), |s| s.as_str().to_string());
        map.insert(KEY_TRACK_ID.to_string(), PropertyValue::ObjectPath(slot));
        if let Some(url) = &self.url {
            map.insert(KEY_URL.to_string(), PropertyValue::Str(url.clone()));
        }
        if let Some(title) = &self.title {
            map.insert(KEY_TITLE.to_string(), PropertyValue::Str(title.clone()));
        }
        if let Some(length) = self.length_us {
            map.insert(KEY_LENGTH.to_string(), PropertyValue::Int64(length));
        }
        PropertyValue::Dict(map)
    }

    /// True when the player reports no current track
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
