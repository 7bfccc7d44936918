//! In-process loopback player
//!
//! Models the parts of an MPRIS player the jukebox relies on: an ordered track list
//! with object-path slot ids, a current entry, a playback status, and
//! `PropertiesChanged` notifications for the Player interface. Played entries stay in
//! the list (VLC keeps its playlist), so `Tracks` only ever grows.
//!
//! Also used as the test double: commands can be rejected, property reads failed,
//! answers delayed and subscriptions refused, and every acknowledged command is
//! recorded.

use super::metadata::{PlaybackStatus, TrackMetadata};
use super::types::{
    BackendError, ChangeFilter, ChangeStream, PlayerCommand, PropertiesChanged, PropertyValue,
    SlotId,
};
use super::{PlayerBackend, PLAYER_INTERFACE, PROP_METADATA, PROP_PLAYBACK_STATUS, PROP_TRACKS, TRACKLIST_INTERFACE};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Slot path prefix for entries created by this player
const SLOT_PREFIX: &str = "/org/mpris/MediaPlayer2/TrackList/";

/// Notification buffer per subscriber
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    slot: SlotId,
    uri: String,
    title: Option<String>,
}

impl Entry {
    fn metadata(&self) -> TrackMetadata {
        TrackMetadata {
            slot: Some(self.slot.clone()),
            url: Some(self.uri.clone()),
            title: self.title.clone(),
            length_us: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    current: Option<usize>,
    stopped: bool,
    next_slot: u64,
    subscribers: Vec<(ChangeFilter, mpsc::Sender<PropertiesChanged>)>,
    fail_next: Option<String>,
    failing_property: Option<String>,
    reject_subscriptions: bool,
    delay: Option<Duration>,
    commands: Vec<PlayerCommand>,
}

impl Inner {
    fn status(&self) -> PlaybackStatus {
        match self.current {
            Some(_) if !self.stopped => PlaybackStatus::Playing,
            _ => PlaybackStatus::Stopped,
        }
    }

    fn current_metadata(&self) -> TrackMetadata {
        match self.current {
            Some(idx) if !self.stopped => self.entries[idx].metadata(),
            _ => TrackMetadata::default(),
        }
    }

    fn allocate_slot(&mut self) -> SlotId {
        self.next_slot += 1;
        SlotId::new(format!("{}{}", SLOT_PREFIX, self.next_slot))
    }

    /// Append an entry and return its index
    fn append(&mut self, uri: String, title: Option<String>) -> usize {
        let slot = self.allocate_slot();
        self.entries.push(Entry { slot, uri, title });
        self.entries.len() - 1
    }

    fn emit(&mut self, changed: BTreeMap<String, PropertyValue>) {
        let change = PropertiesChanged {
            interface: PLAYER_INTERFACE.to_string(),
            changed,
            invalidated: Vec::new(),
        };
        self.deliver(change);
    }

    fn deliver(&mut self, change: PropertiesChanged) {
        self.subscribers.retain(|(filter, tx)| {
            if !filter.matches(&change) {
                return !tx.is_closed();
            }
            match tx.try_send(change.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Dropping player notification: subscriber buffer full");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn emit_track_changed(&mut self) {
        let mut changed = BTreeMap::new();
        changed.insert(PROP_METADATA.to_string(), self.current_metadata().to_value());
        self.emit(changed);
    }

    fn emit_status_changed(&mut self) {
        let mut changed = BTreeMap::new();
        changed.insert(PROP_PLAYBACK_STATUS.to_string(), self.status().to_value());
        self.emit(changed);
    }

    fn apply(&mut self, command: &PlayerCommand) -> Result<PropertyValue, BackendError> {
        match command {
            PlayerCommand::AddTrack {
                uri,
                set_as_current,
            } => {
                let idx = self.append(uri.clone(), None);
                if *set_as_current {
                    let was_stopped = self.status() == PlaybackStatus::Stopped;
                    self.current = Some(idx);
                    self.stopped = false;
                    if was_stopped {
                        self.emit_status_changed();
                    }
                    self.emit_track_changed();
                }
                Ok(PropertyValue::Unit)
            }
            PlayerCommand::Next => {
                if self.status() == PlaybackStatus::Stopped {
                    return Ok(PropertyValue::Unit);
                }
                let next = self.current.map_or(0, |idx| idx + 1);
                if next < self.entries.len() {
                    self.current = Some(next);
                    self.emit_track_changed();
                } else {
                    self.current = None;
                    self.stopped = true;
                    self.emit_status_changed();
                    self.emit_track_changed();
                }
                Ok(PropertyValue::Unit)
            }
            PlayerCommand::GetTracksMetadata { slots } => {
                let items = slots
                    .iter()
                    .filter_map(|slot| self.entries.iter().find(|e| &e.slot == slot))
                    .map(|e| e.metadata().to_value())
                    .collect();
                Ok(PropertyValue::Array(items))
            }
        }
    }
}

/// Loopback player backend
#[derive(Default)]
pub struct MemoryPlayer {
    inner: Mutex<Inner>,
}

impl MemoryPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Reject the next command with the given message
    pub fn fail_next_command(&self, message: impl Into<String>) {
        self.lock().fail_next = Some(message.into());
    }

    /// Reject every read of the named property until called with None
    pub fn fail_reads_of(&self, property: Option<&str>) {
        self.lock().failing_property = property.map(str::to_string);
    }

    /// Delay every answer by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    /// Refuse new change subscriptions
    pub fn reject_subscriptions(&self, reject: bool) {
        self.lock().reject_subscriptions = reject;
    }

    /// Commands acknowledged so far, oldest first
    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.lock().commands.clone()
    }

    /// Number of acknowledged `Next` commands
    pub fn next_count(&self) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| matches!(c, PlayerCommand::Next))
            .count()
    }

    /// All slots in list order
    pub fn slots(&self) -> Vec<SlotId> {
        self.lock().entries.iter().map(|e| e.slot.clone()).collect()
    }

    /// Slot of the current entry while playing
    pub fn current_slot(&self) -> Option<SlotId> {
        self.lock().current_metadata().slot
    }

    /// Add a titled entry without notifications, as if loaded before startup
    pub fn preload(&self, uri: &str, title: &str, play: bool) -> SlotId {
        let mut inner = self.lock();
        let idx = inner.append(uri.to_string(), Some(title.to_string()));
        if play && inner.current.is_none() {
            inner.current = Some(idx);
            inner.stopped = false;
        }
        inner.entries[idx].slot.clone()
    }

    /// Jump to an arbitrary slot, as an external remote control would
    pub fn jump_to(&self, slot: &SlotId) -> bool {
        let mut inner = self.lock();
        match inner.entries.iter().position(|e| &e.slot == slot) {
            Some(idx) => {
                inner.current = Some(idx);
                inner.stopped = false;
                inner.emit_track_changed();
                true
            }
            None => false,
        }
    }

    /// Stop playback, as an external remote control would
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.status() != PlaybackStatus::Stopped {
            inner.stopped = true;
            inner.emit_status_changed();
        }
    }

    /// Push a raw notification to matching subscribers
    pub fn emit(&self, change: PropertiesChanged) {
        self.lock().deliver(change);
    }
}

#[async_trait]
impl PlayerBackend for MemoryPlayer {
    async fn read_property(&self, interface: &str, name: &str) -> Result<PropertyValue, BackendError> {
        self.simulate_latency().await;
        let inner = self.lock();

        if inner.failing_property.as_deref() == Some(name) {
            debug!("Failing read of {} as requested", name);
            return Err(BackendError::Rejected(format!("{} unavailable", name)));
        }

        match (interface, name) {
            (PLAYER_INTERFACE, PROP_PLAYBACK_STATUS) => Ok(inner.status().to_value()),
            (PLAYER_INTERFACE, PROP_METADATA) => Ok(inner.current_metadata().to_value()),
            (TRACKLIST_INTERFACE, PROP_TRACKS) => Ok(PropertyValue::Array(
                inner
                    .entries
                    .iter()
                    .map(|e| PropertyValue::ObjectPath(e.slot.as_str().to_string()))
                    .collect(),
            )),
            _ => Err(BackendError::Rejected(format!(
                "unknown property {}.{}",
                interface, name
            ))),
        }
    }

    async fn invoke(&self, command: PlayerCommand) -> Result<PropertyValue, BackendError> {
        self.simulate_latency().await;
        let mut inner = self.lock();

        if let Some(message) = inner.fail_next.take() {
            debug!("Rejecting {} as requested", command.name());
            return Err(BackendError::Rejected(message));
        }

        let reply = inner.apply(&command)?;
        inner.commands.push(command);
        Ok(reply)
    }

    async fn subscribe_changes(&self, filter: ChangeFilter) -> Result<ChangeStream, BackendError> {
        self.simulate_latency().await;
        let mut inner = self.lock();

        if inner.reject_subscriptions {
            return Err(BackendError::Rejected("AddMatch refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        inner.subscribers.push((filter, tx));
        Ok(ChangeStream::new(rx))
    }
}
