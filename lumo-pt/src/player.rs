//! Content player adapter
//!
//! The embedded third-party video player lives in the browser; this module
//! is the typed seam over it. `PlayerHandle` is what the tracker engine
//! consumes: commands flow out (attach/play/pause/seek), a snapshot of the
//! last known playhead is polled every tick, and player callbacks arrive
//! as `PlayerEvent`s on a broadcast channel.
//!
//! Two implementations:
//! - [`ReportedPlayer`]: production. Browser callbacks are reported over
//!   the HTTP API and recorded here; outbound commands queue in an outbox
//!   the client drains.
//! - [`ScriptedPlayer`]: fake for tests and local development, firing
//!   synthetic events and advancing its own playhead on the tokio clock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Instant;

/// Playback state as reported by the external player
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Playing,
    Paused,
    Ended,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Ended => write!(f, "ended"),
        }
    }
}

/// Error codes the external player can report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerErrorCode {
    /// The video identifier does not resolve to a playable video
    InvalidSourceRef,
    /// The video owner disallows embedded playback
    EmbedBlocked,
    /// Playback failed (network, codec, ...)
    PlaybackFailed,
}

impl std::fmt::Display for PlayerErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerErrorCode::InvalidSourceRef => write!(f, "invalid_source_ref"),
            PlayerErrorCode::EmbedBlocked => write!(f, "embed_blocked"),
            PlayerErrorCode::PlaybackFailed => write!(f, "playback_failed"),
        }
    }
}

/// Player callback events consumed by the tracker engine
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Player metadata loaded; duration known
    Ready { total_seconds: f64 },
    /// Player transitioned between playing/paused/ended
    StateChanged { state: PlayerState },
    /// Terminal player error for the loaded video
    Error {
        code: PlayerErrorCode,
        message: String,
    },
}

/// Last known playhead of the external player
#[derive(Debug, Clone, Copy)]
pub struct PlayerSnapshot {
    pub elapsed_seconds: f64,
    /// 0.0 until the player reports metadata
    pub total_seconds: f64,
    pub state: PlayerState,
}

impl PlayerSnapshot {
    fn detached() -> Self {
        Self {
            elapsed_seconds: 0.0,
            total_seconds: 0.0,
            state: PlayerState::Paused,
        }
    }
}

/// Commands queued for the browser-side player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum PlayerCommand {
    /// Load a new video, optionally starting at a resume hint
    Load {
        source_ref: String,
        resume_seconds: f64,
    },
    Play,
    Pause,
    Seek { seconds: f64 },
}

/// Handle over the external embeddable player
///
/// The engine never talks to the embed directly; everything flows through
/// this trait so tracking logic is testable with a fake player.
#[async_trait]
pub trait PlayerHandle: Send + Sync {
    /// Load a new video into the player, replacing whatever was loaded.
    /// `resume_seconds` is a start-position hint; the authoritative resume
    /// seek still happens on ready, once the duration is known.
    async fn attach(&self, source_ref: &str, resume_seconds: f64);

    async fn play(&self);

    async fn pause(&self);

    async fn seek(&self, seconds: f64);

    /// Last known playhead (polled by the tick loop)
    async fn snapshot(&self) -> PlayerSnapshot;

    /// Subscribe to player callback events
    fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent>;
}

// ============================================================================
// ReportedPlayer (production)
// ============================================================================

struct ReportedInner {
    snapshot: PlayerSnapshot,
}

/// Production player handle, fed by browser callback reports
///
/// The browser client posts the embed's callbacks (`ready`, periodic
/// position, state changes, errors) to the API, which records them here.
/// Commands issued by the engine queue in an outbox the client drains.
pub struct ReportedPlayer {
    inner: RwLock<ReportedInner>,
    events_tx: broadcast::Sender<PlayerEvent>,
    commands: Mutex<Vec<PlayerCommand>>,
}

impl ReportedPlayer {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            inner: RwLock::new(ReportedInner {
                snapshot: PlayerSnapshot::detached(),
            }),
            events_tx,
            commands: Mutex::new(Vec::new()),
        })
    }

    /// Record the embed's ready callback and notify the engine
    pub async fn report_ready(&self, total_seconds: f64) {
        {
            let mut inner = self.inner.write().await;
            inner.snapshot.total_seconds = total_seconds.max(0.0);
        }
        let _ = self.events_tx.send(PlayerEvent::Ready {
            total_seconds: total_seconds.max(0.0),
        });
    }

    /// Record a raw position report from the embed
    pub async fn report_position(&self, elapsed_seconds: f64, total_seconds: f64) {
        let mut inner = self.inner.write().await;
        inner.snapshot.elapsed_seconds = elapsed_seconds;
        if total_seconds > 0.0 {
            inner.snapshot.total_seconds = total_seconds;
        }
    }

    /// Record a state-change callback and notify the engine
    pub async fn report_state(&self, state: PlayerState) {
        {
            let mut inner = self.inner.write().await;
            inner.snapshot.state = state;
        }
        let _ = self.events_tx.send(PlayerEvent::StateChanged { state });
    }

    /// Record a player error callback and notify the engine
    pub async fn report_error(&self, code: PlayerErrorCode, message: String) {
        let _ = self.events_tx.send(PlayerEvent::Error { code, message });
    }

    /// Drain queued commands for the browser-side player
    pub async fn drain_commands(&self) -> Vec<PlayerCommand> {
        std::mem::take(&mut *self.commands.lock().await)
    }

    async fn push_command(&self, command: PlayerCommand) {
        self.commands.lock().await.push(command);
    }
}

#[async_trait]
impl PlayerHandle for ReportedPlayer {
    async fn attach(&self, source_ref: &str, resume_seconds: f64) {
        tracing::debug!(source_ref, resume_seconds, "Queueing player load");
        {
            let mut inner = self.inner.write().await;
            inner.snapshot = PlayerSnapshot::detached();
        }
        self.push_command(PlayerCommand::Load {
            source_ref: source_ref.to_string(),
            resume_seconds,
        })
        .await;
    }

    async fn play(&self) {
        self.push_command(PlayerCommand::Play).await;
    }

    async fn pause(&self) {
        self.push_command(PlayerCommand::Pause).await;
    }

    async fn seek(&self, seconds: f64) {
        // Optimistic: the next client report will reconcile
        {
            let mut inner = self.inner.write().await;
            inner.snapshot.elapsed_seconds = seconds;
        }
        self.push_command(PlayerCommand::Seek { seconds }).await;
    }

    async fn snapshot(&self) -> PlayerSnapshot {
        self.inner.read().await.snapshot
    }

    fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events_tx.subscribe()
    }
}

// ============================================================================
// ScriptedPlayer (fake for tests and local development)
// ============================================================================

struct ScriptedInner {
    state: PlayerState,
    total_seconds: f64,
    base_elapsed: f64,
    playing_since: Option<Instant>,
}

impl ScriptedInner {
    fn elapsed(&self) -> f64 {
        let running = self
            .playing_since
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.base_elapsed + running
    }

    /// Fold the running playhead into base_elapsed before a state change
    fn settle(&mut self) {
        self.base_elapsed = self.elapsed();
        self.playing_since = None;
    }
}

/// Scripted fake player
///
/// Advances its playhead on the tokio clock while in Playing state, so
/// tests driven with paused time get deterministic tick positions.
/// Records attach and seek calls for assertions.
pub struct ScriptedPlayer {
    inner: RwLock<ScriptedInner>,
    events_tx: broadcast::Sender<PlayerEvent>,
    attaches: Mutex<Vec<(String, f64)>>,
    seeks: Mutex<Vec<f64>>,
}

impl ScriptedPlayer {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            inner: RwLock::new(ScriptedInner {
                state: PlayerState::Paused,
                total_seconds: 0.0,
                base_elapsed: 0.0,
                playing_since: None,
            }),
            events_tx,
            attaches: Mutex::new(Vec::new()),
            seeks: Mutex::new(Vec::new()),
        })
    }

    /// Fire the ready callback with the video duration
    pub async fn fire_ready(&self, total_seconds: f64) {
        {
            let mut inner = self.inner.write().await;
            inner.total_seconds = total_seconds;
        }
        let _ = self.events_tx.send(PlayerEvent::Ready { total_seconds });
    }

    /// Fire a state-change callback, updating the internal playhead clock
    pub async fn fire_state(&self, state: PlayerState) {
        {
            let mut inner = self.inner.write().await;
            inner.settle();
            if state == PlayerState::Playing {
                inner.playing_since = Some(Instant::now());
            }
            if state == PlayerState::Ended {
                inner.base_elapsed = inner.total_seconds;
            }
            inner.state = state;
        }
        let _ = self.events_tx.send(PlayerEvent::StateChanged { state });
    }

    /// Fire an error callback
    pub async fn fire_error(&self, code: PlayerErrorCode, message: &str) {
        let _ = self.events_tx.send(PlayerEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    /// Recorded (source_ref, resume_hint) attach calls
    pub async fn attaches(&self) -> Vec<(String, f64)> {
        self.attaches.lock().await.clone()
    }

    /// Recorded seek targets
    pub async fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().await.clone()
    }
}

#[async_trait]
impl PlayerHandle for ScriptedPlayer {
    async fn attach(&self, source_ref: &str, resume_seconds: f64) {
        {
            let mut inner = self.inner.write().await;
            inner.state = PlayerState::Paused;
            inner.total_seconds = 0.0;
            inner.base_elapsed = 0.0;
            inner.playing_since = None;
        }
        self.attaches
            .lock()
            .await
            .push((source_ref.to_string(), resume_seconds));
    }

    async fn play(&self) {
        self.fire_state(PlayerState::Playing).await;
    }

    async fn pause(&self) {
        self.fire_state(PlayerState::Paused).await;
    }

    async fn seek(&self, seconds: f64) {
        {
            let mut inner = self.inner.write().await;
            inner.settle();
            inner.base_elapsed = seconds;
            if inner.state == PlayerState::Playing {
                inner.playing_since = Some(Instant::now());
            }
        }
        self.seeks.lock().await.push(seconds);
    }

    async fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.inner.read().await;
        PlayerSnapshot {
            elapsed_seconds: inner.elapsed(),
            total_seconds: inner.total_seconds,
            state: inner.state,
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Duration};

    #[tokio::test]
    async fn test_reported_player_records_callbacks() {
        let player = ReportedPlayer::new();

        player.attach("abc123xyz", 0.0).await;
        player.report_ready(120.0).await;
        player.report_position(10.5, 120.0).await;
        player.report_state(PlayerState::Playing).await;

        let snap = player.snapshot().await;
        assert_eq!(snap.elapsed_seconds, 10.5);
        assert_eq!(snap.total_seconds, 120.0);
        assert_eq!(snap.state, PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_reported_player_queues_commands() {
        let player = ReportedPlayer::new();

        player.attach("abc123xyz", 42.5).await;
        player.play().await;
        player.seek(17.0).await;

        let commands = player.drain_commands().await;
        assert_eq!(commands.len(), 3);
        match &commands[0] {
            PlayerCommand::Load {
                source_ref,
                resume_seconds,
            } => {
                assert_eq!(source_ref, "abc123xyz");
                assert_eq!(*resume_seconds, 42.5);
            }
            other => panic!("Expected Load, got {:?}", other),
        }

        // Outbox drains
        assert!(player.drain_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_reported_player_attach_resets_snapshot() {
        let player = ReportedPlayer::new();

        player.report_position(55.0, 100.0).await;
        player.attach("next-video", 0.0).await;

        let snap = player.snapshot().await;
        assert_eq!(snap.elapsed_seconds, 0.0);
        assert_eq!(snap.total_seconds, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_player_advances_while_playing() {
        let player = ScriptedPlayer::new();

        player.attach("vid", 0.0).await;
        player.fire_ready(60.0).await;
        player.fire_state(PlayerState::Playing).await;

        advance(Duration::from_secs(3)).await;
        let snap = player.snapshot().await;
        assert!((snap.elapsed_seconds - 3.0).abs() < 1e-6);

        player.fire_state(PlayerState::Paused).await;
        advance(Duration::from_secs(5)).await;
        let snap = player.snapshot().await;
        assert!((snap.elapsed_seconds - 3.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_player_seek_moves_playhead() {
        let player = ScriptedPlayer::new();

        player.attach("vid", 0.0).await;
        player.fire_ready(200.0).await;
        player.seek(42.5).await;

        let snap = player.snapshot().await;
        assert!((snap.elapsed_seconds - 42.5).abs() < 1e-6);
        assert_eq!(player.seeks().await, vec![42.5]);
    }
}
