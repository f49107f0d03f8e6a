//! Tracker engine
//!
//! **Responsibilities:**
//! - Session lifecycle (attach, detach, advance, retreat)
//! - Tick loop: position sampling and dual-store persistence
//! - Completion transitions and deferred auto-advance
//! - Event emission for SSE clients
//!
//! One session at a time: attach tears down the previous session's tick
//! task before creating the new one, so there are never two live timers.
//! Persistence failures are logged and swallowed; progress tracking never
//! interrupts playback.

use crate::cache::PositionCache;
use crate::curriculum::{Curriculum, CurriculumStore};
use crate::error::{Error, Result};
use crate::player::{PlayerErrorCode, PlayerEvent, PlayerHandle, PlayerSnapshot, PlayerState};
use crate::remote::ProgressStore;
use crate::state::{CurrentItem, SharedState};
use crate::tracker::checkpoint::{PositionCheckpoint, ProgressSnapshot};
use crate::tracker::resume::resume_target;
use lumo_common::events::{LumoEvent, SessionState};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tracker tunables, loaded from the settings table at startup
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Tick cadence in milliseconds (clamped to 100-5000)
    pub tick_interval_ms: u32,
    /// Remote writes happen when floor(elapsed) is a multiple of this
    pub remote_write_interval_s: u32,
    /// User-visible delay before auto-advancing past a completed item
    pub advance_delay_ms: u64,
    /// Learner this device tracks for
    pub user_id: Uuid,
}

impl TrackerConfig {
    /// Load tunables from the settings table
    pub async fn load(db: &sqlx::SqlitePool) -> Result<Self> {
        let (tick_interval_ms, remote_write_interval_s, advance_delay_ms, user_id) = tokio::join!(
            crate::db::settings::load_tick_interval_ms(db),
            crate::db::settings::load_remote_write_interval_s(db),
            crate::db::settings::load_advance_delay_ms(db),
            crate::db::settings::get_or_create_user_id(db),
        );

        Ok(Self {
            tick_interval_ms: tick_interval_ms?,
            remote_write_interval_s: remote_write_interval_s?,
            advance_delay_ms: advance_delay_ms?,
            user_id: user_id?,
        })
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            remote_write_interval_s: 5,
            advance_delay_ms: 1500,
            user_id: Uuid::nil(),
        }
    }
}

/// Bookkeeping for the active tracking session
struct ActiveSession {
    curriculum_id: String,
    content_item_id: i64,
    item_index: usize,
    item_count: usize,
    /// Tick/event loop task (None when attach failed before a player
    /// was constructed)
    task: Option<JoinHandle<()>>,
}

/// Tracker engine - orchestrates one playback session at a time
pub struct TrackerEngine {
    /// Shared state (session state, current item, event bus)
    state: Arc<SharedState>,

    /// Handle over the external embeddable player
    player: Arc<dyn PlayerHandle>,

    /// Local position cache (exact seconds, written every tick)
    cache: Arc<dyn PositionCache>,

    /// Remote progress store (coarse snapshot, throttled)
    remote: Arc<dyn ProgressStore>,

    /// Curriculum content lists
    curricula: Arc<dyn CurriculumStore>,

    config: TrackerConfig,

    /// Active session bookkeeping
    session: Arc<RwLock<Option<ActiveSession>>>,

    /// Bumped on every attach/detach; guards stale deferred advances
    epoch: Arc<AtomicU64>,
}

impl TrackerEngine {
    pub fn new(
        state: Arc<SharedState>,
        player: Arc<dyn PlayerHandle>,
        cache: Arc<dyn PositionCache>,
        remote: Arc<dyn ProgressStore>,
        curricula: Arc<dyn CurriculumStore>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            state,
            player,
            cache,
            remote,
            curricula,
            config,
            session: Arc::new(RwLock::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Clone the inner Arcs for sharing across tasks
    fn clone_handles(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            player: Arc::clone(&self.player),
            cache: Arc::clone(&self.cache),
            remote: Arc::clone(&self.remote),
            curricula: Arc::clone(&self.curricula),
            config: self.config.clone(),
            session: Arc::clone(&self.session),
            epoch: Arc::clone(&self.epoch),
        }
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Load a curriculum through the engine's store
    pub async fn load_curriculum(&self, curriculum_id: &str) -> Result<Curriculum> {
        self.curricula.load(curriculum_id).await
    }

    /// Create a curriculum (seed/demo path)
    pub async fn create_curriculum(&self, curriculum: &Curriculum) -> Result<()> {
        self.curricula.create(curriculum).await
    }

    /// Resume target for a curriculum: (item index, item id)
    ///
    /// Used on curriculum load, not during an active session.
    pub async fn resume_target_for(&self, curriculum_id: &str) -> Result<(usize, Option<i64>)> {
        let curriculum = self.curricula.load(curriculum_id).await?;
        let index = resume_target(&curriculum);
        Ok((index, curriculum.contents.get(index).map(|i| i.id)))
    }

    // ========== Session lifecycle ==========

    /// Attach to a curriculum at its resume target
    pub async fn attach_curriculum(&self, curriculum_id: &str) -> Result<()> {
        let curriculum = self.curricula.load(curriculum_id).await?;
        if curriculum.contents.is_empty() {
            return Err(Error::InvalidState(format!(
                "curriculum {} has no content items",
                curriculum_id
            )));
        }
        let index = resume_target(&curriculum);
        self.attach_item(curriculum_id, index).await
    }

    /// Attach to one content item, tearing down any previous session
    ///
    /// Precondition: the item's source_ref must resolve to a plausible
    /// video identifier. A failed resolution is fatal to this item: the
    /// player is not constructed, the session lands in Errored, and the
    /// error is surfaced. Other items remain attachable afterwards.
    pub async fn attach_item(&self, curriculum_id: &str, item_index: usize) -> Result<()> {
        let mut session = self.session.write().await;
        self.teardown_locked(&mut session).await;

        let curriculum = self.curricula.load(curriculum_id).await?;
        let item = curriculum.contents.get(item_index).ok_or_else(|| {
            Error::NotFound(format!(
                "item index {} in curriculum {} ({} items)",
                item_index,
                curriculum_id,
                curriculum.contents.len()
            ))
        })?;

        self.state
            .set_current_item(Some(CurrentItem {
                curriculum_id: curriculum_id.to_string(),
                content_item_id: item.id,
                item_index,
                elapsed_seconds: 0.0,
                total_seconds: 0.0,
            }))
            .await;

        if let Err(e) = validate_source_ref(&item.source_ref) {
            // Fatal to this item: no player, no tick loop. The session
            // entry is kept so manual advance/retreat still work.
            *session = Some(ActiveSession {
                curriculum_id: curriculum_id.to_string(),
                content_item_id: item.id,
                item_index,
                item_count: curriculum.contents.len(),
                task: None,
            });

            let old = self.state.set_session_state(SessionState::Errored).await;
            self.broadcast_state_change(old, SessionState::Errored);
            self.state.broadcast_event(LumoEvent::TrackerError {
                curriculum_id: curriculum_id.to_string(),
                content_item_id: Some(item.id),
                code: PlayerErrorCode::InvalidSourceRef.to_string(),
                message: format!("This video cannot be played: {}", e),
                timestamp: lumo_common::time::now(),
            });

            return Err(e);
        }

        // Resume hint from the local cache; the authoritative, validated
        // seek still happens on ready once the duration is known
        let resume_hint = match self.cache.get(curriculum_id, item.id).await {
            Ok(cached) => cached.unwrap_or(0.0),
            Err(e) => {
                warn!("Position cache read failed: {}", e);
                0.0
            }
        };

        // Subscribe before loading the video so no callback is missed
        let events = self.player.subscribe_events();
        self.player.attach(&item.source_ref, resume_hint).await;

        let old = self.state.set_session_state(SessionState::Idle).await;
        self.broadcast_state_change(old, SessionState::Idle);
        self.state.broadcast_event(LumoEvent::ItemAttached {
            curriculum_id: curriculum_id.to_string(),
            content_item_id: item.id,
            item_index,
            source_ref: item.source_ref.clone(),
            timestamp: lumo_common::time::now(),
        });

        info!(
            "Attached item {} (index {}) of curriculum {}",
            item.id, item_index, curriculum_id
        );

        let epoch = self.epoch.load(Ordering::Acquire);
        let self_clone = self.clone_handles();
        let task = tokio::spawn(async move {
            self_clone.run_session(events, epoch).await;
        });

        *session = Some(ActiveSession {
            curriculum_id: curriculum_id.to_string(),
            content_item_id: item.id,
            item_index,
            item_count: curriculum.contents.len(),
            task: Some(task),
        });

        Ok(())
    }

    /// Detach the active session (user navigation or shutdown)
    ///
    /// Stops the tick task synchronously and issues a best-effort final
    /// flush; in-flight remote writes are neither awaited nor cancelled.
    pub async fn detach(&self) {
        let mut session = self.session.write().await;
        let had_session = session.is_some();
        let detached = session
            .as_ref()
            .map(|s| (s.curriculum_id.clone(), s.content_item_id));
        self.teardown_locked(&mut session).await;
        *session = None;
        drop(session);

        if had_session {
            self.state.set_current_item(None).await;
            let old = self.state.set_session_state(SessionState::Idle).await;
            self.broadcast_state_change(old, SessionState::Idle);
            if let Some((curriculum_id, content_item_id)) = detached {
                self.state.broadcast_event(LumoEvent::SessionDetached {
                    curriculum_id,
                    content_item_id,
                    timestamp: lumo_common::time::now(),
                });
            }
            info!("Session detached");
        }
    }

    /// Move to the next item in the curriculum sequence
    ///
    /// No-op at the last index (no wraparound). The newly attached item
    /// starts from 0; its own resume logic pulls its cached position on
    /// ready.
    pub async fn advance(&self) -> Result<()> {
        let (curriculum_id, item_index, item_count) = self.session_position().await?;

        if item_index + 1 >= item_count {
            debug!("Advance at last item is a no-op");
            return Ok(());
        }

        self.attach_item(&curriculum_id, item_index + 1).await
    }

    /// Move to the previous item in the curriculum sequence
    ///
    /// No-op at index 0 (no wraparound).
    pub async fn retreat(&self) -> Result<()> {
        let (curriculum_id, item_index, _) = self.session_position().await?;

        if item_index == 0 {
            debug!("Retreat at first item is a no-op");
            return Ok(());
        }

        self.attach_item(&curriculum_id, item_index - 1).await
    }

    /// Set `completed = true` on the attached item and persist the full
    /// content list. Idempotent: re-completing writes the same state.
    pub async fn complete_current(&self) -> Result<()> {
        let (curriculum_id, content_item_id) = {
            let session = self.session.read().await;
            let s = session
                .as_ref()
                .ok_or_else(|| Error::InvalidState("no active session".to_string()))?;
            (s.curriculum_id.clone(), s.content_item_id)
        };

        let mut curriculum = self.curricula.load(&curriculum_id).await?;
        let item = curriculum
            .contents
            .iter_mut()
            .find(|i| i.id == content_item_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "item {} in curriculum {}",
                    content_item_id, curriculum_id
                ))
            })?;

        let newly_completed = !item.completed;
        item.completed = true;

        let progress_percent = self
            .curricula
            .save_contents(&curriculum_id, &curriculum.contents)
            .await?;

        if newly_completed {
            info!(
                "Item {} of curriculum {} completed ({}%)",
                content_item_id, curriculum_id, progress_percent
            );
            self.state.broadcast_event(LumoEvent::ItemCompleted {
                curriculum_id: curriculum_id.clone(),
                content_item_id,
                timestamp: lumo_common::time::now(),
            });
        }

        self.state.broadcast_event(LumoEvent::CurriculumProgress {
            curriculum_id,
            progress_percent,
            timestamp: lumo_common::time::now(),
        });

        Ok(())
    }

    // ========== Session task ==========

    /// Tick/event loop for one attached item
    ///
    /// Runs until the item's session ends (Ended, Errored, or the player
    /// event channel closes); attach aborts it before starting the next.
    async fn run_session(&self, mut events: broadcast::Receiver<PlayerEvent>, epoch: u64) {
        let period = Duration::from_millis(self.config.tick_interval_ms as u64);
        // First tick one full period after attach, so a tick never fires
        // at the instant playback starts
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
                event = events.recv() => match event {
                    Ok(PlayerEvent::Ready { total_seconds }) => {
                        self.on_ready(total_seconds).await;
                    }
                    Ok(PlayerEvent::StateChanged { state }) => {
                        if !self.on_player_state(state, epoch).await {
                            break;
                        }
                    }
                    Ok(PlayerEvent::Error { code, message }) => {
                        self.on_player_error(code, message).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Player event stream lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Player event stream closed");
                        break;
                    }
                },
            }
        }
    }

    /// Player reported ready: record the duration and apply the resume
    /// seek from the local cache (exact float; the remote percentage is
    /// too coarse for this).
    async fn on_ready(&self, total_seconds: f64) {
        let Some(item) = self.state.current_item().await else {
            return;
        };

        self.state
            .update_position(item.elapsed_seconds, total_seconds)
            .await;

        let old = self.state.session_state().await;
        if old == SessionState::Idle {
            self.state.set_session_state(SessionState::Ready).await;
            self.broadcast_state_change(old, SessionState::Ready);
        }

        match self.cache.get(&item.curriculum_id, item.content_item_id).await {
            Ok(Some(cached)) if cached > 0.0 && cached < total_seconds => {
                info!(
                    "Resuming item {} at {:.1}s of {:.1}s",
                    item.content_item_id, cached, total_seconds
                );
                self.player.seek(cached).await;
                self.state.update_position(cached, total_seconds).await;
            }
            Ok(_) => {
                // No usable checkpoint: start at 0
            }
            Err(e) => {
                warn!("Position cache read failed: {}", e);
            }
        }
    }

    /// One tick of position tracking
    ///
    /// Only ticks that see the player in Playing state do work; pausing
    /// and buffering produce no writes. The local cache gets every
    /// accepted tick, the remote store only the throttled ones.
    async fn on_tick(&self) {
        let snapshot = self.player.snapshot().await;
        if snapshot.state != PlayerState::Playing {
            return;
        }

        let Some(item) = self.state.current_item().await else {
            return;
        };

        let checkpoint = self.capture_checkpoint(&item, &snapshot).await;

        if self.remote_write_due(&checkpoint) {
            self.spawn_remote_write(checkpoint.clone());
        }

        self.broadcast_position(&checkpoint, true);
    }

    /// Player state-change callback. Returns false when the session loop
    /// should end (item session is over).
    async fn on_player_state(&self, player_state: PlayerState, epoch: u64) -> bool {
        let old = self.state.session_state().await;
        if matches!(old, SessionState::Ended | SessionState::Errored) {
            return false;
        }

        let new = match player_state {
            PlayerState::Playing => SessionState::Playing,
            PlayerState::Paused => SessionState::Paused,
            PlayerState::Ended => SessionState::Ended,
        };

        // Leaving Playing: one final unconditional write to both stores,
        // so pausing never loses more than the in-flight second
        if old == SessionState::Playing && new != SessionState::Playing {
            self.flush_position().await;
        }

        if new != old {
            self.state.set_session_state(new).await;
            self.broadcast_state_change(old, new);
        }

        if new == SessionState::Ended {
            if let Err(e) = self.complete_current().await {
                warn!("Failed to persist completion: {}", e);
            }

            // Deferred auto-advance: give the UI time to show the
            // completion state before cutting to the next item
            let self_clone = self.clone_handles();
            let delay = Duration::from_millis(self.config.advance_delay_ms);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = self_clone.advance_if_epoch(epoch).await {
                    warn!("Auto-advance failed: {}", e);
                }
            });

            return false;
        }

        true
    }

    /// Player reported a terminal error for this item
    ///
    /// The session lands in Errored, a user-facing message is surfaced,
    /// and there is no auto-advance: silently skipping a broken item
    /// would hide content from the learner. `completed` is untouched.
    async fn on_player_error(&self, code: PlayerErrorCode, message: String) {
        let item = self.state.current_item().await;

        let old = self.state.set_session_state(SessionState::Errored).await;
        self.broadcast_state_change(old, SessionState::Errored);

        warn!(
            "Player error on item {:?}: {} ({})",
            item.as_ref().map(|i| i.content_item_id),
            message,
            code
        );

        self.state.broadcast_event(LumoEvent::TrackerError {
            curriculum_id: item
                .as_ref()
                .map(|i| i.curriculum_id.clone())
                .unwrap_or_default(),
            content_item_id: item.as_ref().map(|i| i.content_item_id),
            code: code.to_string(),
            message,
            timestamp: lumo_common::time::now(),
        });
    }

    // ========== Persistence helpers ==========

    /// Capture a clamped checkpoint, update the in-memory position, and
    /// write the local cache (best-effort)
    async fn capture_checkpoint(
        &self,
        item: &CurrentItem,
        snapshot: &PlayerSnapshot,
    ) -> PositionCheckpoint {
        let checkpoint = PositionCheckpoint::capture(
            &item.curriculum_id,
            item.content_item_id,
            snapshot.elapsed_seconds,
            snapshot.total_seconds,
        );

        self.state
            .update_position(checkpoint.elapsed_seconds, checkpoint.total_seconds)
            .await;

        if let Err(e) = self.cache.set(&checkpoint).await {
            // Local storage can be full or unavailable; playback goes on
            warn!("Position cache write failed: {}", e);
        }

        checkpoint
    }

    fn remote_write_due(&self, checkpoint: &PositionCheckpoint) -> bool {
        remote_write_due(
            checkpoint.elapsed_seconds,
            self.config.remote_write_interval_s,
        )
    }

    /// Fire-and-forget remote write; failures are logged and swallowed.
    /// Each write carries a full snapshot, so out-of-order completion is
    /// harmless.
    fn spawn_remote_write(&self, checkpoint: PositionCheckpoint) {
        let store = Arc::clone(&self.remote);
        let user_id = self.config.user_id;
        tokio::spawn(async move {
            let snapshot = ProgressSnapshot::from_checkpoint(&checkpoint);
            if let Err(e) = store
                .upsert(user_id, &checkpoint.curriculum_id, &snapshot)
                .await
            {
                warn!("Remote progress write failed: {}", e);
            }
        });
    }

    /// Final unconditional write to both stores
    async fn flush_position(&self) {
        let snapshot = self.player.snapshot().await;
        let Some(item) = self.state.current_item().await else {
            return;
        };

        let checkpoint = self.capture_checkpoint(&item, &snapshot).await;
        self.spawn_remote_write(checkpoint.clone());
        self.broadcast_position(&checkpoint, false);
    }

    // ========== Internal helpers ==========

    /// (curriculum_id, item_index, item_count) of the active session
    async fn session_position(&self) -> Result<(String, usize, usize)> {
        let session = self.session.read().await;
        let s = session
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no active session".to_string()))?;
        Ok((s.curriculum_id.clone(), s.item_index, s.item_count))
    }

    /// Tear down the current session: abort the tick task first (never
    /// two live timers), then flush the position if playback had started.
    /// Callers hold the session write lock.
    async fn teardown_locked(&self, session: &mut Option<ActiveSession>) {
        self.epoch.fetch_add(1, Ordering::AcqRel);

        if let Some(mut s) = session.take() {
            if let Some(task) = s.task.take() {
                task.abort();
            }

            let state = self.state.session_state().await;
            if matches!(state, SessionState::Playing | SessionState::Paused) {
                self.flush_position().await;
            }
        }
    }

    /// Advance only if no attach/detach happened since `epoch` was read
    /// (a stale deferred advance must not hijack a newer session)
    fn advance_if_epoch(&self, epoch: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.epoch.load(Ordering::Acquire) != epoch {
                debug!("Ignoring stale deferred advance");
                return Ok(());
            }
            self.advance().await
        })
    }

    fn broadcast_state_change(&self, old_state: SessionState, new_state: SessionState) {
        if old_state == new_state {
            return;
        }
        self.state.broadcast_event(LumoEvent::TrackingStateChanged {
            old_state,
            new_state,
            timestamp: lumo_common::time::now(),
        });
    }

    fn broadcast_position(&self, checkpoint: &PositionCheckpoint, playing: bool) {
        self.state.broadcast_event(LumoEvent::PlaybackPosition {
            curriculum_id: checkpoint.curriculum_id.clone(),
            content_item_id: checkpoint.content_item_id,
            elapsed_seconds: checkpoint.elapsed_seconds,
            total_seconds: checkpoint.total_seconds,
            playing,
            timestamp: checkpoint.captured_at,
        });
    }
}

/// Remote throttle gate: floor(elapsed) on a multiple of the write
/// interval. A missed boundary self-heals at the next one.
fn remote_write_due(elapsed_seconds: f64, interval_s: u32) -> bool {
    (elapsed_seconds.floor() as i64).rem_euclid(interval_s.max(1) as i64) == 0
}

/// Check that a source_ref is a plausible external video identifier
///
/// The identifier is opaque to Lumo; this only rejects values that cannot
/// possibly resolve (empty, whitespace, absurd length) before a player is
/// constructed for them.
pub fn validate_source_ref(source_ref: &str) -> Result<()> {
    if source_ref.trim().is_empty() {
        return Err(Error::InvalidSourceRef("empty identifier".to_string()));
    }
    if source_ref.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidSourceRef(format!(
            "identifier contains whitespace: {:?}",
            source_ref
        )));
    }
    if source_ref.len() > 128 {
        return Err(Error::InvalidSourceRef(format!(
            "identifier too long ({} chars)",
            source_ref.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_source_ref() {
        assert!(validate_source_ref("dQw4w9WgXcQ").is_ok());
        assert!(validate_source_ref("").is_err());
        assert!(validate_source_ref("   ").is_err());
        assert!(validate_source_ref("has space").is_err());
        assert!(validate_source_ref(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_remote_write_due_boundaries() {
        assert!(remote_write_due(0.0, 5));
        assert!(!remote_write_due(1.0, 5));
        assert!(!remote_write_due(4.9, 5));
        assert!(remote_write_due(5.0, 5));
        assert!(remote_write_due(5.7, 5));
        assert!(!remote_write_due(6.0, 5));
        assert!(remote_write_due(10.2, 5));

        // Zero interval is treated as 1 rather than dividing by zero
        assert!(remote_write_due(3.0, 0));
    }
}
