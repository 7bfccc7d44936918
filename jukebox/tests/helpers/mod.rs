//! Test helper modules for jukebox integration tests
//!
//! - Harness: loopback player, facade and queue manager wired together
//! - FixedFinder: search provider with canned answers

#![allow(dead_code)]

pub mod harness;

pub use harness::{track, FixedFinder, Harness};
