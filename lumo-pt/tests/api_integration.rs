//! Integration tests for the Progress Tracker API
//!
//! Tests the API surface end to end against an in-memory database:
//! health, curriculum access, session control, player callback reporting,
//! and the player command outbox.

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

use lumo_common::db::init::init_memory_database;
use lumo_pt::api::{create_router, AppState};
use lumo_pt::cache::SqlitePositionCache;
use lumo_pt::curriculum::SqliteCurriculumStore;
use lumo_pt::player::ReportedPlayer;
use lumo_pt::remote::RecordingProgressStore;
use lumo_pt::state::SharedState;
use lumo_pt::tracker::{TrackerConfig, TrackerEngine};
use uuid::Uuid;

/// Test helper to create a router backed by in-memory stores
async fn setup_test_router() -> axum::Router {
    let pool = init_memory_database().await.unwrap();
    let player = ReportedPlayer::new();

    let engine = Arc::new(TrackerEngine::new(
        Arc::new(SharedState::new()),
        player.clone(),
        Arc::new(SqlitePositionCache::new(pool.clone())),
        Arc::new(RecordingProgressStore::new()),
        Arc::new(SqliteCurriculumStore::new(pool.clone())),
        TrackerConfig {
            user_id: Uuid::new_v4(),
            ..TrackerConfig::default()
        },
    ));

    create_router(AppState {
        engine,
        player,
        port: 5810,
    })
}

/// Helper to make a request against the router
async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    use axum::body::Body;
    use http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        _ => panic!("Unsupported method"),
    };

    let request = match body {
        Some(json_body) => Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };

    (status, value)
}

fn demo_curriculum_body() -> Value {
    json!({
        "id": "rust-course",
        "title": "Rust course",
        "contents": [
            {
                "id": 1,
                "title": "Ownership",
                "duration_label": "14:02",
                "completed": true,
                "source_ref": "vid-ownership",
                "notes": ""
            },
            {
                "id": 2,
                "title": "Borrowing",
                "duration_label": "11:30",
                "completed": false,
                "source_ref": "vid-borrowing",
                "notes": ""
            }
        ]
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup_test_router().await;

    let (status, body) = make_request(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "lumo-pt");
}

#[tokio::test]
async fn test_create_and_fetch_curriculum() {
    let app = setup_test_router().await;

    let (status, _) =
        make_request(&app, "POST", "/api/v1/curricula", Some(demo_curriculum_body())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = make_request(&app, "GET", "/api/v1/curricula/rust-course", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["title"], "Rust course");
    assert_eq!(body["contents"].as_array().unwrap().len(), 2);
    assert_eq!(body["contents"][0]["completed"], true);
}

#[tokio::test]
async fn test_fetch_unknown_curriculum_is_404() {
    let app = setup_test_router().await;

    let (status, _) = make_request(&app, "GET", "/api/v1/curricula/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resume_target_endpoint() {
    let app = setup_test_router().await;

    make_request(&app, "POST", "/api/v1/curricula", Some(demo_curriculum_body())).await;

    let (status, body) =
        make_request(&app, "GET", "/api/v1/curricula/rust-course/resume", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["item_index"], 1);
    assert_eq!(body["content_item_id"], 2);
}

#[tokio::test]
async fn test_attach_queues_load_command() {
    let app = setup_test_router().await;

    make_request(&app, "POST", "/api/v1/curricula", Some(demo_curriculum_body())).await;

    let (status, _) = make_request(
        &app,
        "POST",
        "/api/v1/session/attach",
        Some(json!({ "curriculum_id": "rust-course" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Resume target is item index 1 (first incomplete); the load command
    // for its video is queued for the browser-side player
    let (status, body) = make_request(&app, "GET", "/api/v1/player/commands", None).await;
    assert_eq!(status, StatusCode::OK);
    let commands = body.unwrap()["commands"].as_array().unwrap().clone();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["command"], "load");
    assert_eq!(commands[0]["source_ref"], "vid-borrowing");

    // Position reflects the attached session
    let (status, body) = make_request(&app, "GET", "/api/v1/session/position", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["curriculum_id"], "rust-course");
    assert_eq!(body["content_item_id"], 2);
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn test_attach_unknown_curriculum_is_404() {
    let app = setup_test_router().await;

    let (status, _) = make_request(
        &app,
        "POST",
        "/api/v1/session/attach",
        Some(json!({ "curriculum_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_player_ready_report_reaches_session() {
    let app = setup_test_router().await;

    make_request(&app, "POST", "/api/v1/curricula", Some(demo_curriculum_body())).await;
    make_request(
        &app,
        "POST",
        "/api/v1/session/attach",
        Some(json!({ "curriculum_id": "rust-course", "item_index": 0 })),
    )
    .await;

    let (status, _) = make_request(
        &app,
        "POST",
        "/api/v1/player/ready",
        Some(json!({ "total_seconds": 842.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Give the session task a moment to process the ready event
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (_, body) = make_request(&app, "GET", "/api/v1/session/position", None).await;
    let body = body.unwrap();
    assert_eq!(body["state"], "ready");
    assert_eq!(body["total_seconds"], 842.0);
}

#[tokio::test]
async fn test_play_pause_seek_queue_commands() {
    let app = setup_test_router().await;

    make_request(&app, "POST", "/api/v1/session/play", None).await;
    make_request(&app, "POST", "/api/v1/session/pause", None).await;
    make_request(
        &app,
        "POST",
        "/api/v1/session/seek",
        Some(json!({ "seconds": 93.5 })),
    )
    .await;

    let (_, body) = make_request(&app, "GET", "/api/v1/player/commands", None).await;
    let commands = body.unwrap()["commands"].as_array().unwrap().clone();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0]["command"], "play");
    assert_eq!(commands[1]["command"], "pause");
    assert_eq!(commands[2]["command"], "seek");
    assert_eq!(commands[2]["seconds"], 93.5);

    // Draining empties the outbox
    let (_, body) = make_request(&app, "GET", "/api/v1/player/commands", None).await;
    assert!(body.unwrap()["commands"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_advance_without_session_is_conflict() {
    let app = setup_test_router().await;

    let (status, _) = make_request(&app, "POST", "/api/v1/session/advance", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_curriculum_rejects_empty_id() {
    let app = setup_test_router().await;

    let (status, _) = make_request(
        &app,
        "POST",
        "/api/v1/curricula",
        Some(json!({ "id": "  ", "title": "x", "contents": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
