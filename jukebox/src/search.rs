//! Search provider
//!
//! Turns a free-text query into a playable [`Track`]. The bundled finder runs a
//! youtube-dl compatible extractor (`yt-dlp` by default) in simulate mode and picks
//! the best audio stream of the first result.

use crate::catalog::Track;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

/// Something that can find a track for a query
#[async_trait]
pub trait TrackFinder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Track>;
}

/// Extractor output for a search: a playlist of results
#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    entries: Vec<VideoInfo>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    title: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    fragments: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    fragment_base_url: Option<String>,
}

impl FormatInfo {
    fn is_audio_only(&self) -> bool {
        self.vcodec.as_deref().map_or(true, |codec| codec == "none")
    }

    /// Fragmented media must be fetched from the fragment base URL
    fn playable_url(&self) -> Option<&str> {
        let fragmented = self.fragments.as_ref().map_or(false, |f| !f.is_empty());
        if fragmented {
            self.fragment_base_url.as_deref()
        } else {
            self.url.as_deref()
        }
    }
}

/// Audio-only formats first, then highest audio bitrate
fn best_format(formats: &[FormatInfo]) -> Option<&FormatInfo> {
    formats
        .iter()
        .filter(|f| f.playable_url().is_some())
        .max_by(|a, b| {
            let key_a = (a.is_audio_only(), a.abr.unwrap_or(0.0));
            let key_b = (b.is_audio_only(), b.abr.unwrap_or(0.0));
            key_a
                .0
                .cmp(&key_b.0)
                .then(key_a.1.total_cmp(&key_b.1))
        })
}

/// Build a track from extractor JSON output
pub fn track_from_extractor_json(json: &[u8]) -> Result<Track> {
    let results: SearchResults = serde_json::from_slice(json)
        .map_err(|e| Error::Search(format!("unreadable extractor output: {}", e)))?;

    let video = results
        .entries
        .into_iter()
        .next()
        .ok_or_else(|| Error::Search("no results".to_string()))?;

    let format = best_format(&video.formats)
        .ok_or_else(|| Error::Search(format!("no playable format for {}", video.id)))?;
    let url = format.playable_url().unwrap_or_default().to_string();

    Ok(Track::new(
        video.id,
        video.title,
        video.thumbnail.unwrap_or_default(),
        video.tags.unwrap_or_default(),
        url,
    ))
}

/// Finder backed by an external extractor program
#[derive(Debug, Clone)]
pub struct YtDlpFinder {
    program: String,
    query_format: String,
}

impl YtDlpFinder {
    /// `query_format` must contain a `{}` placeholder for the query
    pub fn new(program: impl Into<String>, query_format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            query_format: query_format.into(),
        }
    }

    fn search_term(&self, query: &str) -> String {
        self.query_format.replacen("{}", query, 1)
    }
}

#[async_trait]
impl TrackFinder for YtDlpFinder {
    async fn search(&self, query: &str) -> Result<Track> {
        let term = self.search_term(query);
        debug!("Running {} for {:?}", self.program, term);

        let output = Command::new(&self.program)
            .args(["--simulate", "--dump-single-json", "--no-warnings"])
            .args(["--format", "bestaudio/best"])
            .arg(&term)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Search(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Search(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let track = track_from_extractor_json(&output.stdout)?;
        info!("Found {:?} ({}) for {:?}", track.title, track.id, query);
        Ok(track)
    }
}
