//! Error types for jukebox
//!
//! Every player round-trip failure is converted into one of these variants at the
//! queue manager boundary; raw backend errors never reach the HTTP layer.

use thiserror::Error;

/// Main error type for the jukebox service
#[derive(Error, Debug)]
pub enum Error {
    /// The player rejected a command or property read
    #[error("Player command failed: {0}")]
    PlayerCommand(String),

    /// The player did not answer within the configured bound
    #[error("Player timed out: {0}")]
    PlayerTimeout(String),

    /// Change notification subscription could not be established (fatal at startup)
    #[error("Player subscription failed: {0}")]
    Subscription(String),

    /// Caller asked for a queue mutation that is not supported
    #[error("Invalid queue position: {0}")]
    InvalidPosition(usize),

    /// Mutation requires a non-empty queue
    #[error("Queue is empty")]
    EmptyQueue,

    /// Search provider failure, surfaced unchanged
    #[error("Search error: {0}")]
    Search(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] jukebox_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the failure came from the player and a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PlayerCommand(_) | Error::PlayerTimeout(_))
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PlayerCommand(_) => "player_command",
            Error::PlayerTimeout(_) => "player_timeout",
            Error::Subscription(_) => "subscription",
            Error::InvalidPosition(_) => "invalid_position",
            Error::EmptyQueue => "empty_queue",
            Error::Search(_) => "search",
            Error::Config(_) => "config",
            Error::Http(_) => "http",
            Error::Io(_) => "io",
        }
    }
}

/// Convenience Result type using jukebox Error
pub type Result<T> = std::result::Result<T, Error>;
