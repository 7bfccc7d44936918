//! # Jukebox
//!
//! Keeps a local mirror of a media player's play queue in sync with the player and
//! pushes every change to connected clients.
//!
//! **Architecture:**
//! - [`player`]: typed facade over the player's remote control interface
//! - [`queue`]: authoritative local list, versioned snapshots
//! - [`detector`]: player notifications → reconciliation
//! - [`fanout`]: ordered snapshot delivery to subscribers
//! - [`api`]: HTTP endpoints and the SSE change stream

pub mod api;
pub mod catalog;
pub mod detector;
pub mod error;
pub mod fanout;
pub mod player;
pub mod queue;
pub mod search;

pub use error::{Error, Result};
