//! Change Detector
//!
//! Turns the player's `PropertiesChanged` notifications into reconciliation events.
//!
//! Two tasks, joined by a bounded channel:
//! - reader: drains the player's notification stream and classifies each change
//! - reconciler: feeds classified events into [`QueueManager::reconcile`] one at a time
//!
//! Reconciliation therefore never runs inside a player callback, and a slow
//! reconciliation only backs up the channel.

use crate::error::Result;
use crate::player::{
    ChangeStream, PlaybackStatus, PlayerControl, PropertiesChanged, SlotId, TrackMetadata,
    PLAYER_INTERFACE, PROP_METADATA, PROP_PLAYBACK_STATUS,
};
use crate::queue::QueueManager;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Classified player event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The player started playing the entry `slot`
    SongAdvanced { slot: SlotId, url: Option<String> },
    /// Playback stopped or the list ran out
    QueueExhausted,
    /// Nothing the queue cares about
    Unrelated,
}

/// Classify one notification
///
/// A stop wins over a simultaneous track change. Metadata without a track means the
/// list ran out.
pub fn classify(change: &PropertiesChanged) -> PlayerEvent {
    if change.interface != PLAYER_INTERFACE {
        return PlayerEvent::Unrelated;
    }

    if let Some(value) = change.changed.get(PROP_PLAYBACK_STATUS) {
        if matches!(PlaybackStatus::from_value(value), Ok(PlaybackStatus::Stopped)) {
            return PlayerEvent::QueueExhausted;
        }
    }

    if let Some(value) = change.changed.get(PROP_METADATA) {
        return match TrackMetadata::from_value(value) {
            Ok(TrackMetadata {
                slot: Some(slot),
                url,
                ..
            }) => PlayerEvent::SongAdvanced { slot, url },
            Ok(_) => PlayerEvent::QueueExhausted,
            Err(e) => {
                warn!("Ignoring undecodable metadata change: {}", e);
                PlayerEvent::Unrelated
            }
        };
    }

    PlayerEvent::Unrelated
}

/// Running change detector
pub struct ChangeDetector {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

impl ChangeDetector {
    /// Subscribe to the player and start both tasks
    ///
    /// A rejected subscription is returned as [`crate::Error::Subscription`]; the
    /// caller must not serve requests without it.
    pub async fn start(
        player: &PlayerControl,
        manager: Arc<QueueManager>,
        event_capacity: usize,
    ) -> Result<Self> {
        let stream = player.subscribe_changes().await?;
        info!("Subscribed to {} property changes", player.bus_name());

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(event_capacity.max(1));

        let reader = tokio::spawn(read_changes(stream, tx, cancel.clone()));
        let reconciler = tokio::spawn(apply_events(rx, manager));

        Ok(Self {
            cancel,
            reader,
            reconciler,
        })
    }

    /// True while the reader task is alive
    pub fn is_running(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Stop listening, let queued events finish reconciling
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.reader.await {
            error!("Change reader task failed: {}", e);
        }
        if let Err(e) = self.reconciler.await {
            error!("Reconciler task failed: {}", e);
        }
        info!("Change detector stopped");
    }
}

async fn read_changes(
    mut stream: ChangeStream,
    tx: mpsc::Sender<PlayerEvent>,
    cancel: CancellationToken,
) {
    loop {
        let change = tokio::select! {
            _ = cancel.cancelled() => break,
            change = stream.recv() => change,
        };

        let Some(change) = change else {
            warn!("Player notification stream ended");
            break;
        };

        trace!(
            "Interface: {}, Changed: {:?}, Invalidated: {:?}",
            change.interface,
            change.changed.keys().collect::<Vec<_>>(),
            change.invalidated
        );

        let event = classify(&change);
        if event == PlayerEvent::Unrelated {
            continue;
        }

        debug!("Player event: {:?}", event);
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    stream.close();
}

async fn apply_events(mut rx: mpsc::Receiver<PlayerEvent>, manager: Arc<QueueManager>) {
    while let Some(event) = rx.recv().await {
        if let Some(snapshot) = manager.reconcile(event).await {
            debug!("Reconciled to version {}", snapshot.version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PropertyValue;
    use std::collections::BTreeMap;

    fn change(interface: &str, props: Vec<(&str, PropertyValue)>) -> PropertiesChanged {
        PropertiesChanged {
            interface: interface.to_string(),
            changed: props
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
            invalidated: Vec::new(),
        }
    }

    fn metadata(slot: Option<&str>, url: Option<&str>) -> PropertyValue {
        TrackMetadata {
            slot: slot.map(SlotId::new),
            url: url.map(str::to_string),
            title: None,
            length_us: None,
        }
        .to_value()
    }

    #[test]
    fn test_stopped_means_exhausted() {
        let event = classify(&change(
            PLAYER_INTERFACE,
            vec![(PROP_PLAYBACK_STATUS, PlaybackStatus::Stopped.to_value())],
        ));
        assert_eq!(event, PlayerEvent::QueueExhausted);
    }

    #[test]
    fn test_stop_wins_over_metadata() {
        let event = classify(&change(
            PLAYER_INTERFACE,
            vec![
                (PROP_PLAYBACK_STATUS, PlaybackStatus::Stopped.to_value()),
                (PROP_METADATA, metadata(Some("/t/1"), Some("https://a"))),
            ],
        ));
        assert_eq!(event, PlayerEvent::QueueExhausted);
    }

    #[test]
    fn test_metadata_means_song_advanced() {
        let event = classify(&change(
            PLAYER_INTERFACE,
            vec![
                (PROP_PLAYBACK_STATUS, PlaybackStatus::Playing.to_value()),
                (PROP_METADATA, metadata(Some("/t/1"), Some("https://a"))),
            ],
        ));
        assert_eq!(
            event,
            PlayerEvent::SongAdvanced {
                slot: SlotId::new("/t/1"),
                url: Some("https://a".to_string()),
            }
        );
    }

    #[test]
    fn test_empty_metadata_means_exhausted() {
        let event = classify(&change(PLAYER_INTERFACE, vec![(PROP_METADATA, metadata(None, None))]));
        assert_eq!(event, PlayerEvent::QueueExhausted);
    }

    #[test]
    fn test_other_changes_are_unrelated() {
        let volume = classify(&change(
            PLAYER_INTERFACE,
            vec![("Volume", PropertyValue::Double(0.5))],
        ));
        assert_eq!(volume, PlayerEvent::Unrelated);

        let playing = classify(&change(
            PLAYER_INTERFACE,
            vec![(PROP_PLAYBACK_STATUS, PlaybackStatus::Playing.to_value())],
        ));
        assert_eq!(playing, PlayerEvent::Unrelated);

        let tracklist = classify(&change(
            "org.mpris.MediaPlayer2.TrackList",
            vec![(PROP_METADATA, metadata(Some("/t/1"), None))],
        ));
        assert_eq!(tracklist, PlayerEvent::Unrelated);
    }
}
