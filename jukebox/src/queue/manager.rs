//! Queue State Manager
//!
//! Authoritative in-process mirror of the player's ordered track list.
//!
//! All mutations (insert, skip, reconciliation) run under one state lock that is held
//! for the whole operation, player round-trips and fanout delivery included. This
//! gives:
//! - exactly one read-modify-write on the list at a time
//! - snapshot delivery order == commit order
//! - concurrent inserts reach the player in lock acquisition order
//!
//! Local changes are staged on a copy of the list and only committed once the player
//! acknowledged them, so a failed or timed-out command leaves the list, the version
//! and the subscribers untouched.

use super::snapshot::{QueueSnapshot, VersionSource};
use crate::catalog::{QueuedTrack, Track};
use crate::detector::PlayerEvent;
use crate::error::{Error, Result};
use crate::fanout::{Fanout, Subscription};
use crate::player::{PlaybackStatus, PlayerControl, SlotId};
use futures::stream::Stream;
use jukebox_common::events::QueueEvent;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Mutable queue state, only touched under the state lock
struct LocalQueue {
    tracks: Vec<QueuedTrack>,
    versions: VersionSource,
}

/// Outcome of matching a "now playing" report against the local list
#[derive(Debug, PartialEq)]
enum Advance {
    /// Head already is that entry
    Unchanged,
    /// Entries before the match dropped, match bound and kept as head
    To(Vec<QueuedTrack>),
    /// No local entry corresponds to the report
    NoMatch,
}

fn plan_advance(tracks: &[QueuedTrack], slot: &SlotId, url: Option<&str>) -> Advance {
    match tracks.iter().position(|entry| entry.matches(slot, url)) {
        Some(0) if tracks[0].slot() == Some(slot) => Advance::Unchanged,
        Some(idx) => {
            let mut rest = tracks[idx..].to_vec();
            rest[0] = rest[0].with_slot(slot.clone());
            Advance::To(rest)
        }
        None => Advance::NoMatch,
    }
}

/// Bind the last staged entry to the newest player slot not already taken
fn bind_last_inserted(staged: &mut [QueuedTrack], slots: &[SlotId]) {
    let Some((inserted, earlier)) = staged.split_last_mut() else {
        return;
    };
    let taken: HashSet<&SlotId> = earlier.iter().filter_map(QueuedTrack::slot).collect();

    match slots.iter().rev().find(|slot| !taken.contains(slot)) {
        Some(slot) => {
            debug!("Track {} bound to {}", inserted.track().id, slot);
            *inserted = inserted.with_slot(slot.clone());
        }
        None => warn!(
            "No free player slot for track {}, leaving it unbound",
            inserted.track().id
        ),
    }
}

/// Queue State Manager
pub struct QueueManager {
    player: PlayerControl,
    fanout: Fanout,
    state: Mutex<LocalQueue>,
    current: watch::Sender<Arc<QueueSnapshot>>,
}

impl QueueManager {
    /// Create an empty manager (version 0, no tracks)
    pub fn new(player: PlayerControl, fanout: Fanout) -> Self {
        Self::with_tracks(player, fanout, Vec::new())
    }

    /// Create a manager mirroring what the player is already playing
    ///
    /// Entries from the current track onward are adopted. Failure to read the player
    /// is not fatal: the manager starts empty.
    pub async fn start(player: PlayerControl, fanout: Fanout) -> Self {
        let tracks = match load_player_queue(&player).await {
            Ok(tracks) => {
                info!("Adopted {} tracks from the player", tracks.len());
                tracks
            }
            Err(e) => {
                warn!("Could not read the player's track list, starting empty: {}", e);
                Vec::new()
            }
        };
        Self::with_tracks(player, fanout, tracks)
    }

    fn with_tracks(player: PlayerControl, fanout: Fanout, tracks: Vec<QueuedTrack>) -> Self {
        let mut versions = VersionSource::new();
        let initial = Arc::new(versions.issue(tracks.clone()));
        let (current, _) = watch::channel(initial);

        Self {
            player,
            fanout,
            state: Mutex::new(LocalQueue { tracks, versions }),
            current,
        }
    }

    /// Facade this manager drives
    pub fn player(&self) -> &PlayerControl {
        &self.player
    }

    /// Current snapshot, without waiting for in-flight mutations
    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        self.current.borrow().clone()
    }

    /// Register for every snapshot committed from now on
    pub fn subscribe(&self) -> Subscription {
        self.fanout.subscribe()
    }

    /// Current state followed by every later change, as client events
    ///
    /// A commit racing with the call is delivered exactly once. The stream ends with
    /// a `Shutdown` event when the service stops, or without one if the subscriber
    /// was disconnected for falling behind.
    pub fn events(&self) -> impl Stream<Item = QueueEvent> + Send + 'static {
        // Subscribe before reading: a commit stores its snapshot before publishing it
        let mut subscription = self.fanout.subscribe();
        let current = self.snapshot();

        async_stream::stream! {
            let mut last = current.version;
            yield current.to_event();
            while let Some(snapshot) = subscription.recv().await {
                if snapshot.version > last {
                    last = snapshot.version;
                    yield snapshot.to_event();
                }
            }
            if subscription.was_shut_down() {
                yield QueueEvent::Shutdown { timestamp: chrono::Utc::now() };
            }
        }
    }

    /// Store and publish a new version
    async fn commit(
        &self,
        local: &mut LocalQueue,
        tracks: Vec<QueuedTrack>,
        reason: &str,
    ) -> Arc<QueueSnapshot> {
        local.tracks = tracks;
        let snapshot = Arc::new(local.versions.issue(local.tracks.clone()));
        self.current.send_replace(snapshot.clone());

        info!(
            "Queue version {} ({}): {} tracks",
            snapshot.version,
            reason,
            snapshot.len()
        );
        self.fanout.publish(snapshot.clone()).await;
        snapshot
    }

    /// Append a track and start playback if the player is idle
    ///
    /// If the status read or the insert fails or times out, the track is rolled back
    /// and nothing is published. Once the player acknowledged the insert the call
    /// commits even when the follow-up track list read fails or times out: the entry
    /// is published unbound and a later `SongAdvanced` binds it by URL.
    pub async fn add_track(&self, track: Track) -> Result<Arc<QueueSnapshot>> {
        let track = Arc::new(track);
        let mut local = self.state.lock().await;

        let mut staged = local.tracks.clone();
        staged.push(QueuedTrack::new(track.clone()));

        let status = self.player.playback_status().await?;
        let resume = status == PlaybackStatus::Stopped;

        if let Err(e) = self.player.add_track(&track.url, resume).await {
            warn!("Rolling back insert of {}: {}", track.id, e);
            return Err(e);
        }

        // The insert is acknowledged; an unbound entry is still bound later by URL
        match self.player.track_slots().await {
            Ok(slots) => bind_last_inserted(&mut staged, &slots),
            Err(e) => warn!("Inserted {} but could not read the track list: {}", track.id, e),
        }

        Ok(self.commit(&mut local, staged, "track added").await)
    }

    /// Remove the track at `position`
    ///
    /// Only the playing track (position 0) can be removed; the player is told to skip
    /// and the local list follows what it reports as current afterwards.
    ///
    /// A rejected or timed-out skip changes nothing. Once the skip is acknowledged the
    /// call commits even when reading the new current track fails or times out, and
    /// the head is evicted.
    pub async fn remove_track(&self, position: usize) -> Result<Arc<QueueSnapshot>> {
        let mut local = self.state.lock().await;

        if local.tracks.is_empty() {
            return Err(Error::EmptyQueue);
        }
        if position != 0 {
            return Err(Error::InvalidPosition(position));
        }

        let head = local.tracks[0].clone();
        self.player.next().await?;

        let mut staged = local.tracks.clone();
        match self.player.current_metadata().await {
            Ok(meta) => match meta.slot {
                None => staged.clear(),
                // Skip acknowledged but not yet visible
                Some(slot) if head.matches(&slot, meta.url.as_deref()) => {
                    staged.remove(0);
                }
                Some(slot) => match plan_advance(&staged, &slot, meta.url.as_deref()) {
                    Advance::To(rest) => staged = rest,
                    Advance::Unchanged => {}
                    Advance::NoMatch => {
                        warn!("Player skipped to unknown track {}, resynchronizing", slot);
                        staged.clear();
                    }
                },
            },
            Err(e) => {
                warn!("Skip acknowledged but current track unknown: {}", e);
                staged.remove(0);
            }
        }

        Ok(self.commit(&mut local, staged, "track removed").await)
    }

    /// Apply a player-originated event
    ///
    /// Events are read outside the state lock, so a local mutation may already have
    /// moved past the entry an event names. Before an event empties a non-empty list the
    /// player is asked what it is actually playing, and the list follows that answer.
    ///
    /// Returns the new snapshot, or None when the event did not change the queue.
    pub async fn reconcile(&self, event: PlayerEvent) -> Option<Arc<QueueSnapshot>> {
        let mut local = self.state.lock().await;

        match event {
            PlayerEvent::Unrelated => None,
            PlayerEvent::QueueExhausted => {
                if local.tracks.is_empty() {
                    debug!("Player stopped with an empty queue");
                    return None;
                }
                match self.player.playback_status().await {
                    Ok(PlaybackStatus::Stopped) => {}
                    Ok(status) => {
                        debug!("Stop report is stale, player is {}", status.as_str());
                        return self.follow_player(&mut local, "song advanced").await;
                    }
                    Err(e) => warn!("Could not confirm the stop, trusting the event: {}", e),
                }
                info!("Player stopped, clearing {} tracks", local.tracks.len());
                Some(self.commit(&mut local, Vec::new(), "playback stopped").await)
            }
            PlayerEvent::SongAdvanced { slot, url } => {
                match plan_advance(&local.tracks, &slot, url.as_deref()) {
                    Advance::Unchanged => {
                        debug!("Already playing {}", slot);
                        None
                    }
                    Advance::To(rest) => {
                        let dropped = local.tracks.len() - rest.len();
                        debug!("Player advanced to {}, dropping {} tracks", slot, dropped);
                        Some(self.commit(&mut local, rest, "song advanced").await)
                    }
                    Advance::NoMatch if local.tracks.is_empty() => None,
                    Advance::NoMatch => {
                        debug!("No local entry for {}, asking the player", slot);
                        self.follow_player(&mut local, "song advanced").await
                    }
                }
            }
        }
    }

    /// Move the list to the player's confirmed current track
    ///
    /// Clears the list when the player reports nothing playing or a track the list
    /// does not hold. Keeps it when the player cannot be read.
    async fn follow_player(
        &self,
        local: &mut LocalQueue,
        reason: &str,
    ) -> Option<Arc<QueueSnapshot>> {
        let meta = match self.player.current_metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Could not read the current track, keeping the queue: {}", e);
                return None;
            }
        };

        let Some(slot) = meta.slot else {
            info!("Player has no current track, clearing {} tracks", local.tracks.len());
            return Some(self.commit(local, Vec::new(), "playback stopped").await);
        };

        match plan_advance(&local.tracks, &slot, meta.url.as_deref()) {
            Advance::Unchanged => {
                debug!("Stale event, player is still on {}", slot);
                None
            }
            Advance::To(rest) => Some(self.commit(local, rest, reason).await),
            Advance::NoMatch => {
                warn!(
                    "Player moved to unknown track {}, resynchronizing from scratch",
                    slot
                );
                Some(self.commit(local, Vec::new(), "resync").await)
            }
        }
    }

    /// Wait for the in-flight mutation, then end every subscription
    pub async fn shutdown(&self) {
        let _local = self.state.lock().await;
        self.fanout.shutdown().await;
    }
}

/// Read the upcoming part of the player's list
async fn load_player_queue(player: &PlayerControl) -> Result<Vec<QueuedTrack>> {
    if player.playback_status().await? == PlaybackStatus::Stopped {
        return Ok(Vec::new());
    }

    let Some(current) = player.current_metadata().await?.slot else {
        return Ok(Vec::new());
    };
    let slots = player.track_slots().await?;
    let Some(start) = slots.iter().position(|slot| slot == &current) else {
        return Ok(Vec::new());
    };

    let metadata = player.tracks_metadata(slots[start..].to_vec()).await?;
    Ok(metadata
        .iter()
        .filter_map(|meta| {
            let slot = meta.slot.clone()?;
            let track = Track::from_metadata(meta)?;
            Some(QueuedTrack::bound(Arc::new(track), slot))
        })
        .collect())
}
