//! Remote progress store client
//!
//! Pushes coarse progress snapshots to the platform's progress service.
//! Upserts are full-record overwrites and therefore idempotent; the
//! tracker fires them without awaiting and swallows failures, so a down
//! remote never interrupts playback.

use crate::tracker::ProgressSnapshot;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const USER_AGENT: &str = concat!("lumo-pt/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Remote progress store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),
}

/// Port over the remote progress store
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Upsert the progress snapshot for (user, curriculum)
    async fn upsert(
        &self,
        user_id: Uuid,
        curriculum_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StoreError>;
}

/// HTTP client for the remote progress service
pub struct HttpProgressStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpProgressStore {
    pub fn new(base_url: String) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        curriculum_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}/users/{}/curricula/{}/progress",
            self.base_url, user_id, curriculum_id
        );

        tracing::debug!(
            curriculum_id,
            content_item_id = snapshot.content_item_id,
            elapsed = snapshot.elapsed_seconds,
            "Upserting remote progress snapshot"
        );

        let response = self
            .http_client
            .put(&url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StoreError::Api(status.as_u16(), error_text));
        }

        Ok(())
    }
}

// ============================================================================
// Test double
// ============================================================================

/// One recorded upsert call
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub user_id: Uuid,
    pub curriculum_id: String,
    pub snapshot: ProgressSnapshot,
}

/// Recording in-memory progress store for tests
///
/// Optionally fails every write to exercise the swallow-and-continue
/// failure semantics.
#[derive(Default)]
pub struct RecordingProgressStore {
    writes: tokio::sync::Mutex<Vec<RecordedWrite>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl RecordingProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upsert fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl ProgressStore for RecordingProgressStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        curriculum_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Network("injected failure".to_string()));
        }

        self.writes.lock().await.push(RecordedWrite {
            user_id,
            curriculum_id: curriculum_id.to_string(),
            snapshot: snapshot.clone(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::PositionCheckpoint;

    #[tokio::test]
    async fn test_recording_store_records_upserts() {
        let store = RecordingProgressStore::new();
        let user = Uuid::new_v4();
        let cp = PositionCheckpoint::capture("c-1", 7, 30.0, 120.0);

        store
            .upsert(user, "c-1", &ProgressSnapshot::from_checkpoint(&cp))
            .await
            .unwrap();

        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].user_id, user);
        assert_eq!(writes[0].curriculum_id, "c-1");
        assert!((writes[0].snapshot.progress_percent - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recording_store_can_fail() {
        let store = RecordingProgressStore::new();
        store.set_failing(true);

        let cp = PositionCheckpoint::capture("c-1", 7, 30.0, 120.0);
        let result = store
            .upsert(Uuid::new_v4(), "c-1", &ProgressSnapshot::from_checkpoint(&cp))
            .await;

        assert!(matches!(result, Err(StoreError::Network(_))));
        assert!(store.writes().await.is_empty());
    }

    #[test]
    fn test_http_store_normalizes_base_url() {
        let store = HttpProgressStore::new("http://progress.example.com/api/v1/".to_string()).unwrap();
        assert_eq!(store.base_url, "http://progress.example.com/api/v1");
    }
}
