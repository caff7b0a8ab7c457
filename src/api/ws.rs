// WebSocket handler: streams one session's events and snapshots, accepts player actions.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use super::{game_error, AppState};
use crate::engine::error::{parse_id, GameError, GameResult};
use crate::engine::geometry::{Direction, GridPos};
use crate::engine::snapshot::GameSnapshot;
use crate::engine::{PlayerId, PowerUpId, SessionId};
use crate::metrics;

const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Deserialize)]
pub struct WsParams {
    /// Binds the connection to a player; they are disconnected when it closes.
    pub player_id: Option<String>,
}

/// Actions a client may send as JSON text frames.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    Move {
        player_id: Option<PlayerId>,
        direction: Direction,
    },
    PlaceBomb {
        player_id: Option<PlayerId>,
        /// Defaults to the player's own cell.
        position: Option<GridPos>,
    },
    CollectPowerUp {
        player_id: Option<PlayerId>,
        power_up_id: PowerUpId,
    },
}

/// Replies and periodic pushes. Engine events are sent as-is.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Snapshot(GameSnapshot),
    Error { code: &'static str, error: String },
}

/// WebSocket upgrade handler for a single session.
pub async fn ws_session(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<WsParams>,
) -> Response {
    let bound = parse_id("session_id", &id).and_then(|sid| {
        let player_id = params
            .player_id
            .as_deref()
            .map(|raw| parse_id("player_id", raw))
            .transpose()?;
        state.game_server.get_session(&sid)?;
        Ok((sid, player_id))
    });
    match bound {
        Ok((session_id, player_id)) => ws
            .on_upgrade(move |socket| handle_ws(socket, state, session_id, player_id))
            .into_response(),
        Err(e) => game_error(e),
    }
}

async fn handle_ws(
    mut socket: WebSocket,
    state: AppState,
    session_id: SessionId,
    bound: Option<PlayerId>,
) {
    metrics::CONNECTED_WEBSOCKETS.inc();
    let mut rx = state.events.subscribe();
    let mut refresh = tokio::time::interval(SNAPSHOT_INTERVAL);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) if event.session_id == session_id => {
                        if !send_json(&mut socket, &event).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(session_id = %session_id, skipped = n, "WebSocket client lagged");
                    }
                }
            }
            _ = refresh.tick() => {
                let Ok(snap) = state.game_server.snapshot(&session_id) else {
                    // session was cleared
                    break;
                };
                if !send_json(&mut socket, &ServerMessage::Snapshot(snap)).await {
                    break;
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match handle_action(&state, session_id, bound, text.as_str()) {
                            Ok(snap) => ServerMessage::Snapshot(snap),
                            Err(e) => ServerMessage::Error {
                                code: e.code(),
                                error: e.to_string(),
                            },
                        };
                        if !send_json(&mut socket, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    if let Some(player_id) = bound {
        if let Err(e) = state.game_server.disconnect_player(&session_id, player_id) {
            tracing::debug!(session_id = %session_id, player_id = %player_id, error = %e, "disconnect after close ignored");
        }
    }
    metrics::CONNECTED_WEBSOCKETS.dec();
}

fn handle_action(
    state: &AppState,
    session_id: SessionId,
    bound: Option<PlayerId>,
    text: &str,
) -> GameResult<GameSnapshot> {
    let action: ClientAction = serde_json::from_str(text)
        .map_err(|e| GameError::validation("action", e.to_string()))?;
    let server = &state.game_server;

    match action {
        ClientAction::Move { player_id, direction } => {
            let pid = acting_player(bound, player_id)?;
            server.move_player(&session_id, pid, direction)
        }
        ClientAction::PlaceBomb { player_id, position } => {
            let pid = acting_player(bound, player_id)?;
            let pos = match position {
                Some(p) => p,
                None => server
                    .get_session(&session_id)?
                    .player(pid)
                    .map(|p| p.position)
                    .ok_or(GameError::PlayerNotFound {
                        session_id,
                        player_id: pid,
                    })?,
            };
            server.place_bomb(&session_id, pid, pos)
        }
        ClientAction::CollectPowerUp { player_id, power_up_id } => {
            let pid = acting_player(bound, player_id)?;
            server.collect_power_up(&session_id, pid, power_up_id)
        }
    }
}

/// A bound connection may only act for its own player.
fn acting_player(bound: Option<PlayerId>, requested: Option<PlayerId>) -> GameResult<PlayerId> {
    match (bound, requested) {
        (Some(b), Some(r)) if b != r => Err(GameError::validation(
            "player_id",
            "connection is bound to another player",
        )),
        (Some(b), _) => Ok(b),
        (None, Some(r)) => Ok(r),
        (None, None) => Err(GameError::validation("player_id", "is required")),
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize WebSocket message");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_parse_actions() {
        let pid = Uuid::new_v4();
        let mv: ClientAction =
            serde_json::from_str(&format!(r#"{{"action":"move","player_id":"{pid}","direction":"LEFT"}}"#)).unwrap();
        assert_eq!(
            mv,
            ClientAction::Move {
                player_id: Some(pid),
                direction: Direction::Left
            }
        );

        let bomb: ClientAction = serde_json::from_str(r#"{"action":"place_bomb","position":{"x":3,"y":1}}"#).unwrap();
        assert_eq!(
            bomb,
            ClientAction::PlaceBomb {
                player_id: None,
                position: Some(GridPos::new(3, 1))
            }
        );

        assert!(serde_json::from_str::<ClientAction>(r#"{"action":"fly"}"#).is_err());
    }

    #[test]
    fn test_acting_player() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(acting_player(Some(a), None).unwrap(), a);
        assert_eq!(acting_player(Some(a), Some(a)).unwrap(), a);
        assert_eq!(acting_player(None, Some(b)).unwrap(), b);
        assert!(acting_player(Some(a), Some(b)).is_err());
        assert!(acting_player(None, None).is_err());
    }

    #[test]
    fn test_error_message_shape() {
        let msg = ServerMessage::Error {
            code: "INVALID_MOVE",
            error: "blocked".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "INVALID_MOVE");
    }
}
