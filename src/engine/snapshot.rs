// Read-only projection of a session for broadcast.

use std::time::Instant;

use serde::Serialize;

use super::bomb::BombState;
use super::geometry::GridPos;
use super::map::TileView;
use super::player::PlayerStatus;
use super::powerup::PowerUpType;
use super::session::{GameSession, GameStatus, SessionState};
use super::{BombId, PlayerId, PowerUpId, SessionId};

#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub username: String,
    pub position: GridPos,
    pub status: PlayerStatus,
    pub lives: u32,
    pub remaining_lives: u32,
    pub bomb_count: u32,
    pub bomb_range: u32,
    pub speed: u32,
    pub kills: u32,
    pub deaths: u32,
    pub has_shield: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BombView {
    pub id: BombId,
    pub owner_id: PlayerId,
    pub position: GridPos,
    pub range: u32,
    pub state: BombState,
    pub remaining_fuse_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplosionView {
    pub id: uuid::Uuid,
    pub origin: GridPos,
    pub affected_tiles: Vec<GridPos>,
    pub damage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerUpView {
    pub id: PowerUpId,
    pub position: GridPos,
    #[serde(rename = "type")]
    pub power_up_type: PowerUpType,
    pub value: u32,
    pub remaining_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameSnapshot {
    pub session_id: SessionId,
    pub room_id: Option<String>,
    pub status: GameStatus,
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<Vec<TileView>>,
    pub players: Vec<PlayerView>,
    pub bombs: Vec<BombView>,
    pub explosions: Vec<ExplosionView>,
    pub power_ups: Vec<PowerUpView>,
    /// Epoch millis when the snapshot was taken.
    pub server_time: i64,
    pub round_duration_secs: u64,
    pub elapsed_secs: u64,
    pub winner_id: Option<PlayerId>,
}

impl GameSnapshot {
    /// Build from a state the caller already holds a read or write guard on.
    pub fn capture(session: &GameSession, state: &SessionState, now: Instant) -> Self {
        let map = session.map();
        let elapsed_secs = state
            .started_at
            .map(|start| state.ended_at.unwrap_or(now).saturating_duration_since(start).as_secs())
            .unwrap_or(0);
        let winner_id = if state.status == GameStatus::Finished {
            let mut alive = state.players.iter().filter(|p| p.in_contention());
            match (alive.next(), alive.next()) {
                (Some(p), None) => Some(p.id),
                _ => None,
            }
        } else {
            None
        };

        GameSnapshot {
            session_id: session.id,
            room_id: session.room_id.clone(),
            status: state.status,
            width: map.width,
            height: map.height,
            tiles: map.rows(),
            players: state
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id,
                    username: p.username.clone(),
                    position: p.position,
                    status: p.status,
                    lives: p.lives,
                    remaining_lives: p.remaining_lives(),
                    bomb_count: p.bomb_count,
                    bomb_range: p.bomb_range,
                    speed: p.speed,
                    kills: p.kills,
                    deaths: p.deaths,
                    has_shield: p.has_shield(now),
                })
                .collect(),
            bombs: state
                .bombs
                .iter()
                .map(|b| BombView {
                    id: b.id,
                    owner_id: b.owner_id,
                    position: b.position,
                    range: b.range,
                    state: b.state(),
                    remaining_fuse_ms: b.remaining(now).as_millis() as u64,
                })
                .collect(),
            explosions: state
                .explosions
                .iter()
                .map(|e| ExplosionView {
                    id: e.id,
                    origin: e.origin,
                    affected_tiles: e.affected_tiles.clone(),
                    damage: e.damage,
                })
                .collect(),
            power_ups: state
                .power_ups
                .iter()
                .filter(|p| !p.is_expired(now))
                .map(|p| PowerUpView {
                    id: p.id,
                    position: p.position,
                    power_up_type: p.power_up_type,
                    value: p.value,
                    remaining_ms: p.remaining(now).as_millis() as u64,
                })
                .collect(),
            server_time: chrono::Utc::now().timestamp_millis(),
            round_duration_secs: session.settings().round_duration_secs,
            elapsed_secs,
            winner_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use crate::engine::config::EngineSettings;
    use crate::engine::events::NullSink;
    use crate::engine::map::GameMap;
    use crate::engine::session::GameSession;

    use super::*;

    #[test]
    fn test_snapshot_reflects_state() {
        let session = GameSession::new(
            Uuid::new_v4(),
            Some("room-1".into()),
            Arc::new(GameMap::open(12, 12)),
            EngineSettings::default(),
            Arc::new(NullSink),
        );
        let a = session.add_player(None, "alpha").unwrap().id;
        session.add_player(None, "bravo").unwrap();
        let now = Instant::now();
        session.start(now).unwrap();
        session.place_bomb(a, GridPos::new(1, 1), now).unwrap();

        let snap = session.snapshot(now + Duration::from_millis(1000));
        assert_eq!(snap.status, GameStatus::InProgress);
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.bombs.len(), 1);
        assert_eq!(snap.bombs[0].owner_id, a);
        assert_eq!(snap.bombs[0].remaining_fuse_ms, 2000);
        assert_eq!(snap.tiles.len(), 12);
        assert!(snap.tiles[1][1].has_bomb);
        assert_eq!(snap.elapsed_secs, 1);
        assert_eq!(snap.round_duration_secs, 180);
        assert!(snap.winner_id.is_none());

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "IN_PROGRESS");
        assert_eq!(json["room_id"], "room-1");
        assert_eq!(json["tiles"][0][0]["type"], "SOLID_WALL");
        assert_eq!(json["players"][0]["has_shield"], false);
    }
}
