//! Local mirror of the player's queue

pub mod manager;
pub mod snapshot;

pub use manager::QueueManager;
pub use snapshot::{QueueSnapshot, VersionSource};
