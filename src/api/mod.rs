// HTTP API routes (session control, metrics) and the WebSocket entry point.

pub mod ws;

use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::engine::error::{parse_id, ErrorKind, GameError};
use crate::engine::events::BroadcastSink;
use crate::engine::server::GameServer;
use crate::engine::session::GameStatus;
use crate::metrics;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub room_id: Option<String>,
}

#[derive(Deserialize)]
pub struct AddPlayerRequest {
    pub username: String,
    pub player_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ListSessionsParams {
    pub status: Option<String>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub game_server: Arc<GameServer>,
    pub events: Arc<BroadcastSink>,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, code: &str, msg: &str) -> Response {
    (status, Json(json!({ "error": msg, "code": code }))).into_response()
}

pub(crate) fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
    }
}

fn game_error(e: GameError) -> Response {
    json_error(error_status(e.kind()), e.code(), &e.to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(game_server: Arc<GameServer>, events: Arc<BroadcastSink>) -> Router {
    let state = AppState {
        game_server,
        events,
    };

    Router::new()
        .route("/metrics", get(metrics_text))
        // Sessions
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(clear_session))
        // Roster
        .route("/api/sessions/{id}/players", post(add_player))
        .route(
            "/api/sessions/{id}/players/{player_id}",
            delete(remove_player),
        )
        // Lifecycle
        .route("/api/sessions/{id}/prepare", post(prepare_session))
        .route("/api/sessions/{id}/start", post(start_session))
        .route("/api/sessions/{id}/pause", post(pause_session))
        .route("/api/sessions/{id}/resume", post(resume_session))
        .route("/api/sessions/{id}/end", post(end_session))
        // WebSocket
        .route("/ws/sessions/{id}", get(ws::ws_session))
        .with_state(state)
}

async fn metrics_text() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Session handlers ─────────────────────────────────────────────────

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    match state.game_server.create_session(req.room_id) {
        Ok(session) => match state.game_server.session_info(&session.id) {
            Ok(info) => (StatusCode::CREATED, Json(json!(info))).into_response(),
            Err(e) => game_error(e),
        },
        Err(e) => game_error(e),
    }
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> Response {
    let status = match params.status.as_deref().map(str::parse::<GameStatus>) {
        None => None,
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => return game_error(e),
    };
    let sessions = state.game_server.list_sessions(status);
    (StatusCode::OK, Json(json!(sessions))).into_response()
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = parse_id("session_id", &id).and_then(|sid| state.game_server.snapshot(&sid));
    match result {
        Ok(snap) => (StatusCode::OK, Json(json!(snap))).into_response(),
        Err(e) => game_error(e),
    }
}

async fn clear_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = parse_id("session_id", &id).and_then(|sid| state.game_server.clear_session(&sid));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => game_error(e),
    }
}

// ── Roster handlers ──────────────────────────────────────────────────

async fn add_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddPlayerRequest>,
) -> Response {
    let result = parse_id("session_id", &id).and_then(|sid| {
        let player_id = req
            .player_id
            .as_deref()
            .map(|raw| parse_id("player_id", raw))
            .transpose()?;
        state.game_server.add_player(&sid, player_id, &req.username)
    });
    match result {
        Ok(player) => (
            StatusCode::CREATED,
            Json(json!({
                "player_id": player.id,
                "username": player.username,
                "position": player.position,
                "spawn_point": player.spawn_point,
                "lives": player.lives,
                "status": player.status,
            })),
        )
            .into_response(),
        Err(e) => game_error(e),
    }
}

async fn remove_player(
    State(state): State<AppState>,
    Path((id, player_id)): Path<(String, String)>,
) -> Response {
    let result = parse_id("session_id", &id).and_then(|sid| {
        let pid = parse_id("player_id", &player_id)?;
        state.game_server.remove_player(&sid, pid)
    });
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => game_error(e),
    }
}

// ── Lifecycle handlers ───────────────────────────────────────────────

async fn prepare_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    lifecycle(&id, |sid| state.game_server.prepare_session(sid))
}

async fn start_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    lifecycle(&id, |sid| state.game_server.start_session(sid))
}

async fn pause_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    lifecycle(&id, |sid| state.game_server.pause_session(sid))
}

async fn resume_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    lifecycle(&id, |sid| state.game_server.resume_session(sid))
}

async fn end_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    lifecycle(&id, |sid| state.game_server.end_session(sid))
}

fn lifecycle<F, T>(raw_id: &str, op: F) -> Response
where
    F: FnOnce(&uuid::Uuid) -> Result<T, GameError>,
    T: serde::Serialize,
{
    match parse_id("session_id", raw_id).and_then(|sid| op(&sid)) {
        Ok(body) => (StatusCode::OK, Json(json!(body))).into_response(),
        Err(e) => game_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_map_to_status_codes() {
        assert_eq!(error_status(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(error_status(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(error_status(ErrorKind::Conflict), StatusCode::CONFLICT);
    }

    #[test]
    fn test_game_error_response_status() {
        let resp = game_error(GameError::SessionNotFound(uuid::Uuid::new_v4()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = game_error(GameError::validation("username", "too short"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateSessionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.room_id.is_none());
    }
}
