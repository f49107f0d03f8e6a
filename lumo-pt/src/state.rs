//! Shared tracking state
//!
//! Thread-safe shared state for coordination between the tracker engine
//! and the API layer. Uses RwLock for concurrent read access with rare
//! writes.

use lumo_common::events::{EventBus, LumoEvent, SessionState};
use tokio::sync::{broadcast, RwLock};

/// Currently attached content item
#[derive(Debug, Clone)]
pub struct CurrentItem {
    pub curriculum_id: String,
    pub content_item_id: i64,
    /// Position in the curriculum sequence (0-based)
    pub item_index: usize,
    /// In-memory playback position in seconds
    pub elapsed_seconds: f64,
    /// Total duration in seconds (0.0 until the player reports ready)
    pub total_seconds: f64,
}

/// Shared state accessible by all components
pub struct SharedState {
    /// Current tracking session state
    session_state: RwLock<SessionState>,

    /// Currently attached item (None when no session)
    current_item: RwLock<Option<CurrentItem>>,

    /// Event broadcaster for SSE events
    bus: EventBus,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        Self {
            session_state: RwLock::new(SessionState::Idle),
            current_item: RwLock::new(None),
            bus: EventBus::new(128),
        }
    }

    /// Broadcast an event to all SSE listeners
    ///
    /// No subscribers is a normal condition and is not an error.
    pub fn broadcast_event(&self, event: LumoEvent) {
        self.bus.emit_lossy(event);
    }

    /// Subscribe to the event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<LumoEvent> {
        self.bus.subscribe()
    }

    /// Get current session state
    pub async fn session_state(&self) -> SessionState {
        *self.session_state.read().await
    }

    /// Set session state, returning the previous state
    pub async fn set_session_state(&self, state: SessionState) -> SessionState {
        let mut guard = self.session_state.write().await;
        std::mem::replace(&mut *guard, state)
    }

    /// Get the currently attached item
    pub async fn current_item(&self) -> Option<CurrentItem> {
        self.current_item.read().await.clone()
    }

    /// Set (or clear) the currently attached item
    pub async fn set_current_item(&self, item: Option<CurrentItem>) {
        *self.current_item.write().await = item;
    }

    /// Update the in-memory playback position of the attached item
    pub async fn update_position(&self, elapsed_seconds: f64, total_seconds: f64) {
        let mut guard = self.current_item.write().await;
        if let Some(item) = guard.as_mut() {
            item.elapsed_seconds = elapsed_seconds;
            if total_seconds > 0.0 {
                item.total_seconds = total_seconds;
            }
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
