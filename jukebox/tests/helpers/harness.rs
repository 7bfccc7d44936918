//! Loopback harness

use async_trait::async_trait;
use jukebox::catalog::Track;
use jukebox::fanout::Fanout;
use jukebox::player::{MemoryPlayer, PlayerControl};
use jukebox::queue::QueueManager;
use jukebox::search::TrackFinder;
use jukebox::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const BUS_NAME: &str = "org.mpris.MediaPlayer2.test";

/// Track whose URL is derived from its id
pub fn track(id: &str) -> Track {
    Track::new(
        id,
        format!("Title {id}"),
        format!("https://img/{id}.jpg"),
        Vec::new(),
        format!("https://media/{id}"),
    )
}

/// Loopback player, facade and queue manager
pub struct Harness {
    pub player: Arc<MemoryPlayer>,
    pub control: PlayerControl,
    pub queue: Arc<QueueManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_player(Arc::new(MemoryPlayer::new()), Duration::from_secs(1))
    }

    pub fn with_player(player: Arc<MemoryPlayer>, timeout: Duration) -> Self {
        let control = PlayerControl::new(player.clone(), BUS_NAME, timeout);
        let fanout = Fanout::new(16, Duration::from_secs(1));
        let queue = Arc::new(QueueManager::new(control.clone(), fanout));
        Self {
            player,
            control,
            queue,
        }
    }

    /// Rebuild from whatever the player already holds
    pub async fn started(player: Arc<MemoryPlayer>) -> Self {
        let control = PlayerControl::new(player.clone(), BUS_NAME, Duration::from_secs(1));
        let fanout = Fanout::new(16, Duration::from_secs(1));
        let queue = Arc::new(QueueManager::start(control.clone(), fanout).await);
        Self {
            player,
            control,
            queue,
        }
    }

    /// Add tracks `ids` in order
    pub async fn fill(&self, ids: &[&str]) {
        for id in ids {
            self.queue.add_track(track(id)).await.unwrap();
        }
    }

    /// Ids of the local list in order
    pub fn ids(&self) -> Vec<String> {
        self.queue
            .snapshot()
            .tracks
            .iter()
            .map(|t| t.track().id.clone())
            .collect()
    }
}

/// Search provider answering from a fixed table
#[derive(Default)]
pub struct FixedFinder {
    answers: HashMap<String, Track>,
}

impl FixedFinder {
    pub fn with(mut self, query: &str, answer: Track) -> Self {
        self.answers.insert(query.to_string(), answer);
        self
    }
}

#[async_trait]
impl TrackFinder for FixedFinder {
    async fn search(&self, query: &str) -> Result<Track> {
        self.answers
            .get(query)
            .cloned()
            .ok_or_else(|| Error::Search(format!("no results for {query}")))
    }
}
