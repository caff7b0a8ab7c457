// Game server: owns every live session and routes player actions to them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::metrics;
use crate::worker_pool::TimerPool;

use super::bomb::BombLifecycle;
use super::collision::CollisionValidator;
use super::config::EngineSettings;
use super::error::{GameError, GameResult};
use super::events::EventSink;
use super::geometry::{Direction, GridPos};
use super::mapgen::MapGenerator;
use super::occupancy::TileRegistry;
use super::player::Player;
use super::powerup::{PowerUp, PowerUpLifecycle, PowerUpType};
use super::session::{DetonationReport, GameSession, GameStatus};
use super::snapshot::GameSnapshot;
use super::{BombId, PlayerId, PowerUpId, SessionId};

/// Listing entry for a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub room_id: Option<String>,
    pub status: GameStatus,
    pub players: usize,
    pub max_players: usize,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    fn of(session: &GameSession) -> Self {
        SessionInfo {
            session_id: session.id,
            room_id: session.room_id.clone(),
            status: session.status(),
            players: session.players().len(),
            max_players: session.settings().max_players,
            created_at: session.created_at,
        }
    }
}

/// Registry of sessions plus the shared machinery they run on: the tile
/// registry, a map generator, and the bomb and power-up lifecycles backed by
/// one timer pool.
pub struct GameServer {
    settings: EngineSettings,
    sessions: RwLock<HashMap<SessionId, Arc<GameSession>>>,
    tiles: Arc<TileRegistry>,
    collision: CollisionValidator,
    mapgen: Mutex<MapGenerator>,
    timers: Arc<TimerPool>,
    bombs: BombLifecycle,
    power_ups: Arc<PowerUpLifecycle>,
    sink: Arc<dyn EventSink>,
}

impl GameServer {
    pub fn new(settings: EngineSettings, timers: Arc<TimerPool>, sink: Arc<dyn EventSink>) -> Self {
        let settings = settings.sanitized();
        let tiles = Arc::new(TileRegistry::new());
        let power_ups = Arc::new(PowerUpLifecycle::new(timers.clone(), &settings));
        Self {
            collision: CollisionValidator::new(tiles.clone()),
            mapgen: Mutex::new(MapGenerator::new(settings.seed)),
            bombs: BombLifecycle::new(timers.clone(), power_ups.clone()),
            sessions: RwLock::new(HashMap::new()),
            settings,
            tiles,
            timers,
            power_ups,
            sink,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn timers(&self) -> &Arc<TimerPool> {
        &self.timers
    }

    pub fn tiles(&self) -> &Arc<TileRegistry> {
        &self.tiles
    }

    // --- Registry ---

    /// Generate a fresh arena and register a WAITING session on it.
    /// A room id may be held by one session at a time.
    pub fn create_session(&self, room_id: Option<String>) -> GameResult<Arc<GameSession>> {
        let room_id = match room_id.map(|r| r.trim().to_string()) {
            Some(r) if r.is_empty() => return Err(GameError::validation("room_id", "must not be blank")),
            other => other,
        };

        let map = {
            let mut mapgen = self.mapgen.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::new(mapgen.generate(
                self.settings.map_width,
                self.settings.map_height,
                self.settings.wall_density,
            )?)
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(room) = &room_id {
            if sessions.values().any(|s| s.room_id.as_ref() == Some(room)) {
                return Err(GameError::DuplicateSession(room.clone()));
            }
        }

        let id = Uuid::new_v4();
        self.tiles.insert(id, map.clone());
        let session = Arc::new(GameSession::new(
            id,
            room_id,
            map,
            self.settings.clone(),
            self.sink.clone(),
        ));
        sessions.insert(id, session.clone());
        metrics::ACTIVE_SESSIONS.set(sessions.len() as i64);

        tracing::info!(session_id = %id, room_id = ?session.room_id, "session created");
        Ok(session)
    }

    pub fn get_session(&self, session_id: &SessionId) -> GameResult<Arc<GameSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or(GameError::SessionNotFound(*session_id))
    }

    pub fn sessions(&self) -> Vec<Arc<GameSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn sessions_by_status(&self, status: GameStatus) -> Vec<Arc<GameSession>> {
        self.sessions()
            .into_iter()
            .filter(|s| s.status() == status)
            .collect()
    }

    /// Listing for the HTTP layer, oldest first.
    pub fn list_sessions(&self, status: Option<GameStatus>) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions()
            .iter()
            .map(|s| SessionInfo::of(s))
            .filter(|i| status.map_or(true, |st| i.status == st))
            .collect();
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    pub fn session_info(&self, session_id: &SessionId) -> GameResult<SessionInfo> {
        let session = self.get_session(session_id)?;
        Ok(SessionInfo::of(&session))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Tear a session down. Pending fuse and expiry timers see the session
    /// closed (or gone) when they fire and do nothing.
    pub fn clear_session(&self, session_id: &SessionId) -> GameResult<()> {
        let session = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let session = sessions
                .remove(session_id)
                .ok_or(GameError::SessionNotFound(*session_id))?;
            metrics::ACTIVE_SESSIONS.set(sessions.len() as i64);
            session
        };
        session.close();
        self.tiles.remove(session_id);
        tracing::info!(session_id = %session_id, status = %session.status(), "session cleared");
        Ok(())
    }

    // --- Roster ---

    pub fn add_player(
        &self,
        session_id: &SessionId,
        player_id: Option<PlayerId>,
        username: &str,
    ) -> GameResult<Player> {
        let session = self.get_session(session_id)?;
        self.track(session.add_player(player_id, username))
    }

    pub fn remove_player(&self, session_id: &SessionId, player_id: PlayerId) -> GameResult<()> {
        let session = self.get_session(session_id)?;
        self.track(session.remove_player(player_id, Instant::now()))
    }

    pub fn disconnect_player(&self, session_id: &SessionId, player_id: PlayerId) -> GameResult<()> {
        let session = self.get_session(session_id)?;
        session.disconnect_player(player_id, Instant::now())
    }

    // --- Lifecycle ---

    pub fn prepare_session(&self, session_id: &SessionId) -> GameResult<GameSnapshot> {
        self.lifecycle(session_id, |s, now| s.prepare(now))
    }

    pub fn start_session(&self, session_id: &SessionId) -> GameResult<GameSnapshot> {
        self.lifecycle(session_id, |s, now| s.start(now))
    }

    pub fn pause_session(&self, session_id: &SessionId) -> GameResult<GameSnapshot> {
        self.lifecycle(session_id, |s, now| s.pause(now))
    }

    pub fn resume_session(&self, session_id: &SessionId) -> GameResult<GameSnapshot> {
        self.lifecycle(session_id, |s, now| s.resume(now))
    }

    pub fn end_session(&self, session_id: &SessionId) -> GameResult<GameSnapshot> {
        self.lifecycle(session_id, |s, now| s.end(now))
    }

    fn lifecycle<F>(&self, session_id: &SessionId, op: F) -> GameResult<GameSnapshot>
    where
        F: FnOnce(&GameSession, Instant) -> GameResult<()>,
    {
        let session = self.get_session(session_id)?;
        let now = Instant::now();
        self.track(op(&session, now))?;
        Ok(session.snapshot(now))
    }

    // --- Actions ---

    pub fn move_player(
        &self,
        session_id: &SessionId,
        player_id: PlayerId,
        direction: Direction,
    ) -> GameResult<GameSnapshot> {
        let session = self.get_session(session_id)?;
        let now = Instant::now();
        self.track(session.move_player(player_id, direction, now))?;
        Ok(session.snapshot(now))
    }

    pub fn place_bomb(
        &self,
        session_id: &SessionId,
        player_id: PlayerId,
        pos: GridPos,
    ) -> GameResult<GameSnapshot> {
        let session = self.get_session(session_id)?;
        self.track(self.bombs.place(&session, player_id, pos))?;
        Ok(session.snapshot(Instant::now()))
    }

    pub fn explode_bomb(
        &self,
        session_id: &SessionId,
        bomb_id: BombId,
    ) -> GameResult<DetonationReport> {
        let session = self.get_session(session_id)?;
        self.track(self.bombs.explode(&session, bomb_id))
    }

    pub fn collect_power_up(
        &self,
        session_id: &SessionId,
        player_id: PlayerId,
        power_up_id: PowerUpId,
    ) -> GameResult<GameSnapshot> {
        let session = self.get_session(session_id)?;
        self.track(self.power_ups.collect(&session, player_id, power_up_id))?;
        Ok(session.snapshot(Instant::now()))
    }

    pub fn spawn_power_up(
        &self,
        session_id: &SessionId,
        power_up_type: PowerUpType,
        pos: GridPos,
    ) -> GameResult<PowerUp> {
        let session = self.get_session(session_id)?;
        self.power_ups.spawn(&session, power_up_type, pos)
    }

    pub fn can_move_to(&self, session_id: &SessionId, pos: GridPos) -> bool {
        self.collision.can_move_to(session_id, pos)
    }

    pub fn snapshot(&self, session_id: &SessionId) -> GameResult<GameSnapshot> {
        Ok(self.get_session(session_id)?.snapshot(Instant::now()))
    }

    pub fn winner(&self, session_id: &SessionId) -> GameResult<Option<Player>> {
        Ok(self.get_session(session_id)?.winner())
    }

    // --- Driver ---

    /// One driver tick over every IN_PROGRESS session. Walls destroyed by
    /// swept bombs roll for drops just like timer-driven explosions.
    /// Returns the number of sessions updated.
    pub fn update_all(&self, now: Instant) -> usize {
        let started = Instant::now();
        let mut ticked = 0;
        for session in self.sessions_by_status(GameStatus::InProgress) {
            let report = session.update(now);
            for detonation in &report.detonations {
                self.power_ups.roll_drops(&session, &detonation.destroyed_walls);
            }
            if report.finished {
                tracing::debug!(session_id = %session.id, "session finished during tick");
            }
            ticked += 1;
        }
        metrics::SESSION_TICK_DURATION_MS.observe(started.elapsed().as_secs_f64() * 1000.0);
        ticked
    }

    fn track<T>(&self, result: GameResult<T>) -> GameResult<T> {
        if let Err(e) = &result {
            metrics::ACTIONS_REJECTED_TOTAL
                .with_label_values(&[e.kind().as_str()])
                .inc();
            tracing::debug!(code = e.code(), error = %e, "action rejected");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ErrorKind;
    use crate::engine::events::NullSink;

    fn server() -> GameServer {
        let settings = EngineSettings {
            seed: Some(7),
            ..EngineSettings::default()
        };
        GameServer::new(settings, Arc::new(TimerPool::new(2)), Arc::new(NullSink))
    }

    fn two_players(server: &GameServer) -> (SessionId, PlayerId, PlayerId) {
        let s = server.create_session(None).unwrap();
        let a = server.add_player(&s.id, None, "alpha").unwrap().id;
        let b = server.add_player(&s.id, None, "bravo").unwrap().id;
        (s.id, a, b)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let server = server();
        let s = server.create_session(Some("lobby-1".into())).unwrap();
        assert_eq!(s.status(), GameStatus::Waiting);
        assert_eq!(server.get_session(&s.id).unwrap().id, s.id);
        assert!(server.tiles().get(&s.id).is_some());
        assert_eq!(server.session_count(), 1);

        let missing = Uuid::new_v4();
        assert!(matches!(server.get_session(&missing), Err(GameError::SessionNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_session_info() {
        let server = server();
        let (sid, _, _) = two_players(&server);
        let info = server.session_info(&sid).unwrap();
        assert_eq!(info.session_id, sid);
        assert_eq!(info.players, 2);
        assert_eq!(info.max_players, 4);
        assert_eq!(info.status, GameStatus::Waiting);
        assert!(matches!(server.session_info(&Uuid::new_v4()), Err(GameError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_room_id_is_unique() {
        let server = server();
        server.create_session(Some("lobby".into())).unwrap();
        assert!(matches!(
            server.create_session(Some(" lobby ".into())),
            Err(GameError::DuplicateSession(r)) if r == "lobby"
        ));
        assert!(server.create_session(Some("  ".into())).is_err());
        assert!(server.create_session(None).is_ok());
        assert!(server.create_session(None).is_ok());
    }

    #[tokio::test]
    async fn test_sessions_by_status() {
        let server = server();
        let (sid, _, _) = two_players(&server);
        server.create_session(None).unwrap();
        server.start_session(&sid).unwrap();
        assert_eq!(server.sessions_by_status(GameStatus::InProgress).len(), 1);
        assert_eq!(server.sessions_by_status(GameStatus::Waiting).len(), 1);
        let listed = server.list_sessions(Some(GameStatus::InProgress));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].players, 2);
        assert_eq!(server.list_sessions(None).len(), 2);
    }

    #[tokio::test]
    async fn test_actions_return_snapshots() {
        let server = server();
        let (sid, a, _) = two_players(&server);
        let snap = server.start_session(&sid).unwrap();
        assert_eq!(snap.status, GameStatus::InProgress);

        assert!(server.can_move_to(&sid, GridPos::new(2, 1)));
        let snap = server.move_player(&sid, a, Direction::Right).unwrap();
        let me = snap.players.iter().find(|p| p.id == a).unwrap();
        assert_eq!(me.position, GridPos::new(2, 1));
        assert!(!server.can_move_to(&sid, GridPos::new(2, 1)));

        let snap = server.place_bomb(&sid, a, GridPos::new(2, 1)).unwrap();
        assert_eq!(snap.bombs.len(), 1);
        assert_eq!(server.timers().pending(), 1);
    }

    #[tokio::test]
    async fn test_rejections_are_typed() {
        let server = server();
        let (sid, a, _) = two_players(&server);
        let err = server.move_player(&sid, a, Direction::Right).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "INVALID_GAME_STATE");

        server.start_session(&sid).unwrap();
        let err = server
            .collect_power_up(&sid, a, Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = server
            .move_player(&Uuid::new_v4(), a, Direction::Right)
            .unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_clear_session_drops_everything() {
        let server = server();
        let (sid, a, _) = two_players(&server);
        server.start_session(&sid).unwrap();
        let session = server.get_session(&sid).unwrap();
        server.place_bomb(&sid, a, GridPos::new(1, 1)).unwrap();

        server.clear_session(&sid).unwrap();
        assert!(session.is_closed());
        assert!(server.get_session(&sid).is_err());
        assert!(server.tiles().get(&sid).is_none());
        assert!(!server.can_move_to(&sid, GridPos::new(2, 1)));
        assert!(server.clear_session(&sid).is_err());
    }

    #[tokio::test]
    async fn test_update_all_only_touches_running_sessions() {
        let server = server();
        let (sid, _, _) = two_players(&server);
        server.create_session(None).unwrap();
        assert_eq!(server.update_all(Instant::now()), 0);
        server.start_session(&sid).unwrap();
        assert_eq!(server.update_all(Instant::now()), 1);
        server.pause_session(&sid).unwrap();
        assert_eq!(server.update_all(Instant::now()), 0);
        server.resume_session(&sid).unwrap();
        server.end_session(&sid).unwrap();
        assert_eq!(server.update_all(Instant::now()), 0);
        assert!(server.winner(&sid).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prepare_then_start() {
        let server = server();
        let (sid, a, _) = two_players(&server);
        assert_eq!(server.prepare_session(&sid).unwrap().status, GameStatus::Starting);
        assert!(server.add_player(&sid, None, "charlie").is_err());
        server.start_session(&sid).unwrap();
        server.disconnect_player(&sid, a).unwrap();
        assert_eq!(server.snapshot(&sid).unwrap().status, GameStatus::Finished);
    }
}
