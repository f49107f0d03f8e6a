//! REST API for the Progress Tracker
//!
//! The browser client drives the tracker through these endpoints: session
//! control in, player callback reports in, player commands and SSE events
//! out.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::player::ReportedPlayer;
use crate::tracker::TrackerEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Tracker engine
    pub engine: Arc<TrackerEngine>,
    /// Production player handle (callback reports, command outbox)
    pub player: Arc<ReportedPlayer>,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Session control
                .route("/session/attach", post(handlers::attach))
                .route("/session/detach", post(handlers::detach))
                .route("/session/advance", post(handlers::advance))
                .route("/session/retreat", post(handlers::retreat))
                .route("/session/play", post(handlers::play))
                .route("/session/pause", post(handlers::pause))
                .route("/session/seek", post(handlers::seek))
                .route("/session/position", get(handlers::get_position))
                // Curricula
                .route("/curricula", post(handlers::create_curriculum))
                .route("/curricula/:curriculum_id", get(handlers::get_curriculum))
                .route(
                    "/curricula/:curriculum_id/resume",
                    get(handlers::get_resume_target),
                )
                // Player callback reports from the browser client
                .route("/player/ready", post(handlers::player_ready))
                .route("/player/position", post(handlers::player_position))
                .route("/player/state", post(handlers::player_state))
                .route("/player/error", post(handlers::player_error))
                .route("/player/commands", get(handlers::drain_player_commands))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "lumo-pt",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}
