//! # Lumo Progress Tracker Library (lumo-pt)
//!
//! Playback-progress tracking for learning curricula.
//!
//! **Purpose:** Own one playback session at a time, persist the learner's
//! position to the local cache (every tick) and the remote progress store
//! (throttled), decide completion transitions, and pick the resume target
//! when a curriculum is reopened. Provides an HTTP/SSE control interface
//! for the browser client that hosts the embedded player.

pub mod api;
pub mod cache;
pub mod curriculum;
pub mod db;
pub mod error;
pub mod player;
pub mod remote;
pub mod state;
pub mod tracker;

pub use error::{Error, Result};
pub use state::SharedState;
