//! Progress tracking core
//!
//! Owns one playback session at a time: the in-memory position of the
//! attached content item, persistence of checkpoints to the local cache
//! (every tick) and the remote store (throttled), completion transitions,
//! and resume-target selection.

pub mod checkpoint;
pub mod engine;
pub mod resume;

pub use checkpoint::{PositionCheckpoint, ProgressSnapshot};
pub use engine::{TrackerConfig, TrackerEngine};
pub use resume::resume_target;
