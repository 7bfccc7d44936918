//! Player control facade
//!
//! Thin, stateless wrapper over a [`PlayerBackend`]: reads properties, invokes
//! commands and opens the change notification stream. Every round-trip is bounded by
//! the configured timeout, and backend failures are mapped to [`crate::Error`] here.

pub mod dbus;
pub mod memory;
pub mod metadata;
pub mod types;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use dbus::DbusPlayer;
pub use memory::MemoryPlayer;
pub use metadata::{PlaybackStatus, TrackMetadata};
pub use types::{
    BackendError, ChangeFilter, ChangeStream, PlayerCommand, PropertiesChanged, PropertyValue,
    SlotId,
};

/// Object path of the MPRIS player
pub const PLAYER_PATH: &str = "/org/mpris/MediaPlayer2";
/// Player interface (playback status, metadata, transport commands)
pub const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
/// Track list interface (ordered entries, insertion)
pub const TRACKLIST_INTERFACE: &str = "org.mpris.MediaPlayer2.TrackList";

/// Player.PlaybackStatus
pub const PROP_PLAYBACK_STATUS: &str = "PlaybackStatus";
/// Player.Metadata
pub const PROP_METADATA: &str = "Metadata";
/// TrackList.Tracks
pub const PROP_TRACKS: &str = "Tracks";

/// Capability set of an external player
///
/// Implementations decode wire payloads into [`PropertyValue`] and report transport
/// problems as [`BackendError`]. They must not apply timeouts of their own.
#[async_trait]
pub trait PlayerBackend: Send + Sync {
    /// Read one property of the given interface
    async fn read_property(
        &self,
        interface: &str,
        name: &str,
    ) -> std::result::Result<PropertyValue, BackendError>;

    /// Invoke a command and wait for its acknowledgment
    async fn invoke(
        &self,
        command: PlayerCommand,
    ) -> std::result::Result<PropertyValue, BackendError>;

    /// Register a match rule and open the notification stream
    async fn subscribe_changes(
        &self,
        filter: ChangeFilter,
    ) -> std::result::Result<ChangeStream, BackendError>;
}

/// Facade used by the queue manager and change detector
#[derive(Clone)]
pub struct PlayerControl {
    backend: Arc<dyn PlayerBackend>,
    bus_name: String,
    timeout: Duration,
}

impl PlayerControl {
    pub fn new(backend: Arc<dyn PlayerBackend>, bus_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            bus_name: bus_name.into(),
            timeout,
        }
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one round-trip under the timeout and map its failure
    async fn round_trip<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{} failed: {}", what, e);
                Err(Error::PlayerCommand(format!("{}: {}", what, e)))
            }
            Err(_) => {
                warn!("{} timed out after {:?}", what, self.timeout);
                Err(Error::PlayerTimeout(format!(
                    "{} did not answer within {:?}",
                    what, self.timeout
                )))
            }
        }
    }

    async fn read(&self, interface: &str, name: &str) -> Result<PropertyValue> {
        debug!("Reading {}.{}", interface, name);
        self.round_trip(name, self.backend.read_property(interface, name))
            .await
    }

    async fn invoke(&self, command: PlayerCommand) -> Result<PropertyValue> {
        let name = command.name();
        debug!("Invoking {}", name);
        self.round_trip(name, self.backend.invoke(command)).await
    }

    /// Current Player.PlaybackStatus
    pub async fn playback_status(&self) -> Result<PlaybackStatus> {
        let value = self.read(PLAYER_INTERFACE, PROP_PLAYBACK_STATUS).await?;
        PlaybackStatus::from_value(&value).map_err(|e| Error::PlayerCommand(e.to_string()))
    }

    /// Metadata of the track the player considers current
    pub async fn current_metadata(&self) -> Result<TrackMetadata> {
        let value = self.read(PLAYER_INTERFACE, PROP_METADATA).await?;
        TrackMetadata::from_value(&value).map_err(|e| Error::PlayerCommand(e.to_string()))
    }

    /// Ordered slot identifiers of the player's track list
    pub async fn track_slots(&self) -> Result<Vec<SlotId>> {
        let value = self.read(TRACKLIST_INTERFACE, PROP_TRACKS).await?;
        let items = value
            .as_array()
            .ok_or_else(|| Error::PlayerCommand(format!("Tracks is not a list: {:?}", value)))?;

        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(SlotId::new)
                    .ok_or_else(|| Error::PlayerCommand(format!("bad track id {:?}", item)))
            })
            .collect()
    }

    /// Metadata for each of the given slots, in the player's answer order
    pub async fn tracks_metadata(&self, slots: Vec<SlotId>) -> Result<Vec<TrackMetadata>> {
        let reply = self
            .invoke(PlayerCommand::GetTracksMetadata { slots })
            .await?;
        let items = reply.as_array().ok_or_else(|| {
            Error::PlayerCommand(format!("GetTracksMetadata reply is not a list: {:?}", reply))
        })?;

        items
            .iter()
            .map(|item| {
                TrackMetadata::from_value(item).map_err(|e| Error::PlayerCommand(e.to_string()))
            })
            .collect()
    }

    /// Append a track; `set_as_current` also starts playing it
    pub async fn add_track(&self, uri: &str, set_as_current: bool) -> Result<()> {
        self.invoke(PlayerCommand::AddTrack {
            uri: uri.to_string(),
            set_as_current,
        })
        .await
        .map(|_| ())
    }

    /// Skip to the next track
    pub async fn next(&self) -> Result<()> {
        self.invoke(PlayerCommand::Next).await.map(|_| ())
    }

    /// Subscribe to Player interface property changes of this player instance
    ///
    /// Any failure here is a [`Error::Subscription`].
    pub async fn subscribe_changes(&self) -> Result<ChangeStream> {
        let filter = ChangeFilter {
            sender: self.bus_name.clone(),
            path: PLAYER_PATH.to_string(),
            interface: Some(PLAYER_INTERFACE.to_string()),
        };

        match tokio::time::timeout(self.timeout, self.backend.subscribe_changes(filter)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Error::Subscription(format!(
                "could not register matching rule for {}: {}",
                self.bus_name, e
            ))),
            Err(_) => Err(Error::Subscription(format!(
                "match rule registration for {} timed out",
                self.bus_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPlayer;
    use super::*;

    fn control(player: Arc<MemoryPlayer>, timeout: Duration) -> PlayerControl {
        PlayerControl::new(player, "org.mpris.MediaPlayer2.test", timeout)
    }

    #[tokio::test]
    async fn test_status_and_track_list() {
        let player = Arc::new(MemoryPlayer::new());
        let ctl = control(player.clone(), Duration::from_secs(1));

        assert_eq!(ctl.playback_status().await.unwrap(), PlaybackStatus::Stopped);
        assert!(ctl.track_slots().await.unwrap().is_empty());

        ctl.add_track("https://a", true).await.unwrap();
        ctl.add_track("https://b", false).await.unwrap();

        let slots = ctl.track_slots().await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(ctl.playback_status().await.unwrap(), PlaybackStatus::Playing);

        let current = ctl.current_metadata().await.unwrap();
        assert_eq!(current.slot.as_ref(), Some(&slots[0]));
        assert_eq!(current.url.as_deref(), Some("https://a"));

        let metas = ctl.tracks_metadata(slots.clone()).await.unwrap();
        assert_eq!(metas[1].url.as_deref(), Some("https://b"));
    }

    #[tokio::test]
    async fn test_rejected_command_maps_to_player_command_error() {
        let player = Arc::new(MemoryPlayer::new());
        player.fail_next_command("no such uri");
        let ctl = control(player, Duration::from_secs(1));

        let err = ctl.add_track("https://a", false).await.unwrap_err();
        assert!(matches!(err, Error::PlayerCommand(_)));
    }

    #[tokio::test]
    async fn test_slow_player_maps_to_timeout_error() {
        let player = Arc::new(MemoryPlayer::new());
        player.set_delay(Some(Duration::from_millis(500)));
        let ctl = control(player, Duration::from_millis(20));

        let err = ctl.playback_status().await.unwrap_err();
        assert!(matches!(err, Error::PlayerTimeout(_)));
    }

    #[tokio::test]
    async fn test_rejected_subscription_maps_to_subscription_error() {
        let player = Arc::new(MemoryPlayer::new());
        player.reject_subscriptions(true);
        let ctl = control(player, Duration::from_secs(1));

        let err = ctl.subscribe_changes().await.unwrap_err();
        assert!(matches!(err, Error::Subscription(_)));
    }
}
