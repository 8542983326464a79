//! Cumulus - personal cloud server.
//!
//! The core is a resumable remote download manager: URLs are probed for
//! metadata, streamed to local storage by per-download workers, and exposed
//! through a REST surface plus a WebSocket live channel. Records persist
//! through a pluggable store; progress fans out to all connected observers.

pub mod cli;
pub mod client;
pub mod config;
pub mod models;
pub mod repository;
pub mod server;
pub mod services;
pub mod utils;
