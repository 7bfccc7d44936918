//! HTTP API
//!
//! Track list, mutations and the change stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
