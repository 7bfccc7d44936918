//! # Jukebox Common Library
//!
//! Shared code for the jukebox service and its tooling:
//! - Bootstrap configuration loading (TOML + defaults)
//! - Queue event types serialized for SSE clients
//! - SSE response helpers
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
