//! Player wire types
//!
//! Property payloads arrive from the player as tagged values. They are decoded into
//! [`PropertyValue`] by the backend so nothing above the facade inspects type tags.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// MPRIS object path for "no track"
pub const NO_TRACK: &str = "/org/mpris/MediaPlayer2/TrackList/NoTrack";

/// Insertion target understood by VLC as "end of the track list"
pub const APPEND_TRACK: &str = "/org/mpris/MediaPlayer2/TrackList/Append";

/// Player-assigned identifier of one track list entry (an object path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the MPRIS "no track" sentinel path
    pub fn is_no_track(&self) -> bool {
        self.0 == NO_TRACK
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded property value, one case per wire type the player uses
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Unit,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Array(Vec<PropertyValue>),
    Dict(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// D-Bus style type signature of this value
    pub fn signature(&self) -> &'static str {
        match self {
            PropertyValue::Unit => "",
            PropertyValue::Bool(_) => "b",
            PropertyValue::Int64(_) => "x",
            PropertyValue::UInt64(_) => "t",
            PropertyValue::Double(_) => "d",
            PropertyValue::Str(_) => "s",
            PropertyValue::ObjectPath(_) => "o",
            PropertyValue::Array(_) => "av",
            PropertyValue::Dict(_) => "a{sv}",
        }
    }

    /// String content of `Str` and `ObjectPath` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) | PropertyValue::ObjectPath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int64(v) => Some(*v),
            PropertyValue::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            PropertyValue::Dict(map) => Some(map),
            _ => None,
        }
    }
}

/// Commands the facade can issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    /// TrackList.AddTrack, always after the last entry
    AddTrack { uri: String, set_as_current: bool },
    /// Player.Next
    Next,
    /// TrackList.GetTracksMetadata
    GetTracksMetadata { slots: Vec<SlotId> },
}

impl PlayerCommand {
    /// Method name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            PlayerCommand::AddTrack { .. } => "AddTrack",
            PlayerCommand::Next => "Next",
            PlayerCommand::GetTracksMetadata { .. } => "GetTracksMetadata",
        }
    }
}

/// One `PropertiesChanged` notification
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
    /// Interface whose properties changed
    pub interface: String,
    pub changed: BTreeMap<String, PropertyValue>,
    pub invalidated: Vec<String>,
}

/// Match rule restricting which notifications a subscription receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Bus name of the player instance
    pub sender: String,
    /// Object path emitting the signal
    pub path: String,
    /// Only notifications for this interface, or all when None
    pub interface: Option<String>,
}

impl ChangeFilter {
    pub fn matches(&self, change: &PropertiesChanged) -> bool {
        self.interface
            .as_deref()
            .map_or(true, |interface| interface == change.interface)
    }
}

/// Push stream of property changes
///
/// Dropping the stream (or calling [`ChangeStream::close`]) unsubscribes.
#[derive(Debug)]
pub struct ChangeStream {
    rx: mpsc::Receiver<PropertiesChanged>,
}

impl ChangeStream {
    pub fn new(rx: mpsc::Receiver<PropertiesChanged>) -> Self {
        Self { rx }
    }

    /// Next notification, or None once the player side closed the stream
    pub async fn recv(&mut self) -> Option<PropertiesChanged> {
        self.rx.recv().await
    }

    /// Stop receiving; buffered notifications are still returned by `recv`
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Transport-level failure reported by a backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The player answered with an error
    #[error("rejected by player: {0}")]
    Rejected(String),

    /// The player could not be reached
    #[error("player unreachable: {0}")]
    Disconnected(String),

    /// The answer did not have the expected shape
    #[error("unexpected reply: {0}")]
    Malformed(String),
}
