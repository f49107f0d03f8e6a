//! HTTP request handlers
//!
//! Implements the REST endpoints for session control, curriculum access,
//! and player callback reporting.

use crate::api::AppState;
use crate::curriculum::{ContentItem, Curriculum};
use crate::error::Error;
use crate::player::{PlayerCommand, PlayerErrorCode, PlayerHandle, PlayerState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub curriculum_id: String,
    /// Explicit item to attach; omitted means "attach at the resume
    /// target"
    pub item_index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    curriculum_id: Option<String>,
    content_item_id: Option<i64>,
    item_index: Option<usize>,
    elapsed_seconds: f64,
    total_seconds: f64,
    state: String,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct ResumeTargetResponse {
    item_index: usize,
    content_item_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCurriculumRequest {
    pub id: String,
    pub title: String,
    pub contents: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
pub struct PlayerReadyRequest {
    pub total_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct PlayerPositionRequest {
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct PlayerStateRequest {
    pub state: PlayerState,
}

#[derive(Debug, Deserialize)]
pub struct PlayerErrorRequest {
    pub code: PlayerErrorCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PlayerCommandsResponse {
    commands: Vec<PlayerCommand>,
}

/// Map service errors to HTTP responses
fn error_response(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::BadRequest(_) | Error::InvalidSourceRef(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

type HandlerResult<T> = std::result::Result<T, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Session control
// ============================================================================

/// POST /session/attach - attach a curriculum item and start tracking
pub async fn attach(
    State(state): State<AppState>,
    Json(request): Json<AttachRequest>,
) -> HandlerResult<Json<StatusResponse>> {
    info!(
        "Attach request: curriculum={}, item_index={:?}",
        request.curriculum_id, request.item_index
    );

    let result = match request.item_index {
        Some(index) => {
            state
                .engine
                .attach_item(&request.curriculum_id, index)
                .await
        }
        None => state.engine.attach_curriculum(&request.curriculum_id).await,
    };

    result.map_err(error_response)?;
    Ok(StatusResponse::ok())
}

/// POST /session/detach - stop tracking (final flush)
pub async fn detach(State(state): State<AppState>) -> Json<StatusResponse> {
    state.engine.detach().await;
    StatusResponse::ok()
}

/// POST /session/advance - move to the next item (no-op at the end)
pub async fn advance(State(state): State<AppState>) -> HandlerResult<Json<StatusResponse>> {
    state.engine.advance().await.map_err(error_response)?;
    Ok(StatusResponse::ok())
}

/// POST /session/retreat - move to the previous item (no-op at index 0)
pub async fn retreat(State(state): State<AppState>) -> HandlerResult<Json<StatusResponse>> {
    state.engine.retreat().await.map_err(error_response)?;
    Ok(StatusResponse::ok())
}

/// POST /session/play - queue a play command for the embedded player
pub async fn play(State(state): State<AppState>) -> Json<StatusResponse> {
    state.player.play().await;
    StatusResponse::ok()
}

/// POST /session/pause - queue a pause command for the embedded player
pub async fn pause(State(state): State<AppState>) -> Json<StatusResponse> {
    state.player.pause().await;
    StatusResponse::ok()
}

/// POST /session/seek - queue a seek command for the embedded player
pub async fn seek(
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> Json<StatusResponse> {
    state.player.seek(request.seconds.max(0.0)).await;
    StatusResponse::ok()
}

/// GET /session/position - current tracking position
pub async fn get_position(State(state): State<AppState>) -> Json<PositionResponse> {
    let shared = state.engine.shared_state();
    let session_state = shared.session_state().await;
    let item = shared.current_item().await;

    Json(PositionResponse {
        curriculum_id: item.as_ref().map(|i| i.curriculum_id.clone()),
        content_item_id: item.as_ref().map(|i| i.content_item_id),
        item_index: item.as_ref().map(|i| i.item_index),
        elapsed_seconds: item.as_ref().map(|i| i.elapsed_seconds).unwrap_or(0.0),
        total_seconds: item.as_ref().map(|i| i.total_seconds).unwrap_or(0.0),
        state: session_state.to_string(),
    })
}

// ============================================================================
// Curricula
// ============================================================================

/// POST /curricula - create a curriculum with its content list
pub async fn create_curriculum(
    State(state): State<AppState>,
    Json(request): Json<CreateCurriculumRequest>,
) -> HandlerResult<(StatusCode, Json<StatusResponse>)> {
    if request.id.trim().is_empty() {
        return Err(error_response(Error::BadRequest(
            "curriculum id must not be empty".to_string(),
        )));
    }

    let curriculum = Curriculum {
        id: request.id,
        title: request.title,
        contents: request.contents,
        progress_percent: 0.0,
    };

    state
        .engine
        .create_curriculum(&curriculum)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            status: "created".to_string(),
        }),
    ))
}

/// GET /curricula/:id - curriculum with ordered content items
pub async fn get_curriculum(
    State(state): State<AppState>,
    Path(curriculum_id): Path<String>,
) -> HandlerResult<Json<Curriculum>> {
    let curriculum = state
        .engine
        .load_curriculum(&curriculum_id)
        .await
        .map_err(error_response)?;
    Ok(Json(curriculum))
}

/// GET /curricula/:id/resume - which item a learner lands on
pub async fn get_resume_target(
    State(state): State<AppState>,
    Path(curriculum_id): Path<String>,
) -> HandlerResult<Json<ResumeTargetResponse>> {
    let (item_index, content_item_id) = state
        .engine
        .resume_target_for(&curriculum_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ResumeTargetResponse {
        item_index,
        content_item_id,
    }))
}

// ============================================================================
// Player callback reports
// ============================================================================

/// POST /player/ready - embed loaded metadata
pub async fn player_ready(
    State(state): State<AppState>,
    Json(request): Json<PlayerReadyRequest>,
) -> Json<StatusResponse> {
    state.player.report_ready(request.total_seconds).await;
    StatusResponse::ok()
}

/// POST /player/position - raw playhead report from the embed
pub async fn player_position(
    State(state): State<AppState>,
    Json(request): Json<PlayerPositionRequest>,
) -> Json<StatusResponse> {
    state
        .player
        .report_position(request.elapsed_seconds, request.total_seconds)
        .await;
    StatusResponse::ok()
}

/// POST /player/state - embed state-change callback
pub async fn player_state(
    State(state): State<AppState>,
    Json(request): Json<PlayerStateRequest>,
) -> Json<StatusResponse> {
    state.player.report_state(request.state).await;
    StatusResponse::ok()
}

/// POST /player/error - embed error callback
pub async fn player_error(
    State(state): State<AppState>,
    Json(request): Json<PlayerErrorRequest>,
) -> Json<StatusResponse> {
    state.player.report_error(request.code, request.message).await;
    StatusResponse::ok()
}

/// GET /player/commands - drain queued commands for the embed
pub async fn drain_player_commands(State(state): State<AppState>) -> Json<PlayerCommandsResponse> {
    let commands = state.player.drain_commands().await;
    Json(PlayerCommandsResponse { commands })
}
