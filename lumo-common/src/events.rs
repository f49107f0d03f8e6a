//! Event types for the Lumo event system
//!
//! Provides shared event definitions and EventBus for Lumo services.
//! Events are broadcast via EventBus and can be serialized for SSE
//! transmission to connected browser clients.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Tracking session state for the attached content item
///
/// Lifecycle: `Idle -> Ready -> Playing <-> Paused -> Ended`.
/// `Idle` is entered on attach, before the external player reports ready.
/// `Ended` and `Errored` are terminal for that item's session; a new
/// session begins with the next attach.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Attached, waiting for the player to report ready
    Idle,
    /// Player ready, duration known, resume seek applied
    Ready,
    Playing,
    Paused,
    /// Playback reached the end of the item
    Ended,
    /// Player reported a terminal error for this item
    Errored,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Ended => write!(f, "ended"),
            SessionState::Errored => write!(f, "errored"),
        }
    }
}

/// Lumo event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// All services use this central enum for type safety and exhaustive
/// matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LumoEvent {
    /// Tracking session state changed
    ///
    /// Triggers:
    /// - SSE: Update player UI controls
    /// - Position persistence: final flush happens on leaving Playing
    TrackingStateChanged {
        /// Session state before change
        old_state: SessionState,
        /// Session state after change
        new_state: SessionState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A content item was attached and a new tracking session began
    ///
    /// Triggers:
    /// - SSE: Load the item's video into the embedded player
    /// - UI: Highlight the active item in the curriculum list
    ItemAttached {
        /// Curriculum the item belongs to
        curriculum_id: String,
        /// Attached content item
        content_item_id: i64,
        /// Position of the item in the curriculum sequence (0-based)
        item_index: usize,
        /// Opaque external video identifier to load
        source_ref: String,
        /// When the item was attached
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback position update (sent every tick during playback, and
    /// once more on the final flush when playback stops)
    ///
    /// Triggers:
    /// - SSE: Update progress bar
    PlaybackPosition {
        curriculum_id: String,
        content_item_id: i64,
        /// Current position in seconds (clamped to [0, total])
        elapsed_seconds: f64,
        /// Total duration in seconds (0.0 until player metadata loads)
        total_seconds: f64,
        /// Whether currently playing (false on the final flush)
        playing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A content item transitioned to completed
    ///
    /// Triggers:
    /// - SSE: Mark the item done in the curriculum list
    /// - UI: Show the completion state before auto-advance
    ItemCompleted {
        curriculum_id: String,
        content_item_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Derived curriculum progress changed (recomputed on completion
    /// write-back; the per-item completed flags remain the source of truth)
    CurriculumProgress {
        curriculum_id: String,
        /// Share of completed items, 0.0-100.0
        progress_percent: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The tracker hit a fatal-to-this-item error
    ///
    /// Covers both configuration errors (unresolvable video identifier,
    /// no player constructed) and player-reported playback errors. The
    /// tracker never auto-advances past an errored item.
    ///
    /// Triggers:
    /// - SSE: Surface a user-facing message on the item
    TrackerError {
        curriculum_id: String,
        /// Item the error applies to (None when no item was attachable)
        content_item_id: Option<i64>,
        /// Machine-readable error code
        code: String,
        /// User-facing message
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active session was detached (user navigation or shutdown)
    SessionDetached {
        curriculum_id: String,
        content_item_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl LumoEvent {
    /// Event type name for the SSE `event:` field
    pub fn type_name(&self) -> &'static str {
        match self {
            LumoEvent::TrackingStateChanged { .. } => "TrackingStateChanged",
            LumoEvent::ItemAttached { .. } => "ItemAttached",
            LumoEvent::PlaybackPosition { .. } => "PlaybackPosition",
            LumoEvent::ItemCompleted { .. } => "ItemCompleted",
            LumoEvent::CurriculumProgress { .. } => "CurriculumProgress",
            LumoEvent::TrackerError { .. } => "TrackerError",
            LumoEvent::SessionDetached { .. } => "SessionDetached",
        }
    }
}

/// Broadcast bus for LumoEvent
///
/// Wraps tokio::broadcast, providing:
/// - Multiple producers (any component holding a reference can emit)
/// - Multiple consumers (each subscriber gets every event)
/// - Lossy delivery for slow consumers (broadcast semantics)
pub struct EventBus {
    sender: broadcast::Sender<LumoEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Subscribe to the event stream
    ///
    /// Each receiver sees every event emitted after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<LumoEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns Err when there are no subscribers.
    pub fn emit(
        &self,
        event: LumoEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<LumoEvent>> {
        self.sender.send(event)
    }

    /// Emit an event, ignoring delivery failures
    ///
    /// No subscribers is a normal condition (e.g. no SSE client connected),
    /// not an error worth propagating.
    pub fn emit_lossy(&self, event: LumoEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
