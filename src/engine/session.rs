use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bomb::{Bomb, BombState};
use super::config::{EngineSettings, MIN_PLAYERS};
use super::entity::{HitOutcome, Movable};
use super::error::{GameError, GameResult};
use super::events::{EventSink, GameEvent};
use super::explosion::{self, Explosion};
use super::geometry::{Direction, GridPos};
use super::map::GameMap;
use super::player::{Player, PlayerStatus};
use super::powerup::{PowerUp, PowerUpEffect};
use super::snapshot::GameSnapshot;
use super::{BombId, PlayerId, PowerUpId, SessionId};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Waiting,
    Starting,
    InProgress,
    Paused,
    Finished,
}

impl GameStatus {
    /// Legal edges of the session lifecycle. FINISHED is terminal.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (self, next),
            (Waiting, Starting)
                | (Waiting, InProgress)
                | (Starting, InProgress)
                | (InProgress, Paused)
                | (Paused, InProgress)
                | (Waiting | Starting | InProgress | Paused, Finished)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "WAITING",
            GameStatus::Starting => "STARTING",
            GameStatus::InProgress => "IN_PROGRESS",
            GameStatus::Paused => "PAUSED",
            GameStatus::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITING" => Ok(GameStatus::Waiting),
            "STARTING" => Ok(GameStatus::Starting),
            "IN_PROGRESS" => Ok(GameStatus::InProgress),
            "PAUSED" => Ok(GameStatus::Paused),
            "FINISHED" => Ok(GameStatus::Finished),
            other => Err(GameError::validation("status", format!("unknown status {other:?}"))),
        }
    }
}

/// Everything guarded by the session lock.
pub struct SessionState {
    pub status: GameStatus,
    pub players: Vec<Player>,
    pub bombs: Vec<Bomb>,
    pub explosions: Vec<Explosion>,
    pub power_ups: Vec<PowerUp>,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
}

impl SessionState {
    fn new() -> Self {
        SessionState {
            status: GameStatus::Waiting,
            players: Vec::new(),
            bombs: Vec::new(),
            explosions: Vec::new(),
            power_ups: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.in_contention()).count()
    }

    fn player_index(&self, session_id: SessionId, player_id: PlayerId) -> GameResult<usize> {
        self.players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound {
                session_id,
                player_id,
            })
    }

    fn require(&self, expected: GameStatus, action: &'static str) -> GameResult<()> {
        if self.status != expected {
            return Err(GameError::InvalidState {
                action,
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition(
        &mut self,
        next: GameStatus,
        action: &'static str,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> GameResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(GameError::InvalidState {
                action,
                status: self.status,
            });
        }
        let previous = self.status;
        self.status = next;
        if next == GameStatus::Finished {
            self.ended_at = Some(now);
        }
        events.push(GameEvent::SessionStateChanged {
            previous,
            status: next,
        });
        Ok(())
    }
}

/// Outcome of one bomb going off.
#[derive(Debug, Clone)]
pub struct DetonationReport {
    pub bomb_id: BombId,
    pub owner_id: PlayerId,
    pub origin: GridPos,
    pub affected_tiles: Vec<GridPos>,
    /// Players standing in the blast, shielded or not.
    pub affected_players: Vec<PlayerId>,
    pub killed: Vec<PlayerId>,
    pub destroyed_walls: Vec<GridPos>,
}

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub position: GridPos,
    /// Effect of a power-up picked up on arrival.
    pub collected: Option<PowerUpEffect>,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub detonations: Vec<DetonationReport>,
    pub cleared_explosions: usize,
    pub expired_power_ups: usize,
    pub respawned: Vec<PlayerId>,
    pub finished: bool,
}

/// One match: grid, roster, bombs, blasts and power-ups behind a single
/// reader/writer lock.
///
/// Lock order is always session lock first, then individual tile locks.
/// Events produced under the lock are published after it is released.
pub struct GameSession {
    pub id: SessionId,
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    settings: EngineSettings,
    map: Arc<GameMap>,
    state: RwLock<SessionState>,
    closed: AtomicBool,
    sink: Arc<dyn EventSink>,
}

impl GameSession {
    pub fn new(
        id: SessionId,
        room_id: Option<String>,
        map: Arc<GameMap>,
        settings: EngineSettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        GameSession {
            id,
            room_id,
            created_at: Utc::now(),
            settings,
            map,
            state: RwLock::new(SessionState::new()),
            closed: AtomicBool::new(false),
            sink,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<GameEvent>) {
        for event in events {
            self.sink.publish(self.id, event);
        }
    }

    // --- Accessors ---

    pub fn map(&self) -> &Arc<GameMap> {
        &self.map
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn status(&self) -> GameStatus {
        self.read().status
    }

    /// Torn down by the registry. Pending timers check this before acting.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn player(&self, player_id: PlayerId) -> Option<Player> {
        self.read().players.iter().find(|p| p.id == player_id).cloned()
    }

    pub fn players(&self) -> Vec<Player> {
        self.read().players.clone()
    }

    pub fn bombs(&self) -> Vec<Bomb> {
        self.read().bombs.clone()
    }

    pub fn explosions(&self) -> Vec<Explosion> {
        self.read().explosions.clone()
    }

    pub fn power_ups(&self) -> Vec<PowerUp> {
        self.read().power_ups.clone()
    }

    pub fn alive_count(&self) -> usize {
        self.read().alive_count()
    }

    /// The sole remaining contender, if exactly one is left.
    pub fn winner(&self) -> Option<Player> {
        let state = self.read();
        let mut alive = state.players.iter().filter(|p| p.in_contention());
        match (alive.next(), alive.next()) {
            (Some(p), None) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self, now: Instant) -> GameSnapshot {
        let state = self.read();
        GameSnapshot::capture(self, &state, now)
    }

    // --- Roster ---

    /// Join while WAITING. The first free corner spawn is claimed for the player.
    pub fn add_player(&self, player_id: Option<PlayerId>, username: &str) -> GameResult<Player> {
        let username = Player::validate_username(username)?;
        if self.is_closed() {
            return Err(GameError::SessionNotFound(self.id));
        }

        let mut state = self.write();
        state.require(GameStatus::Waiting, "add player")?;

        let id = player_id.unwrap_or_else(Uuid::new_v4);
        if state.players.iter().any(|p| p.id == id) {
            return Err(GameError::DuplicatePlayer(id));
        }
        if state.players.len() >= self.settings.max_players {
            return Err(GameError::SessionFull(self.id));
        }

        let spawn = self
            .map
            .spawn_points()
            .iter()
            .copied()
            .filter(|sp| !state.players.iter().any(|p| p.spawn_point == *sp))
            .find(|sp| self.map.try_occupy(*sp, false))
            .ok_or(GameError::SessionFull(self.id))?;

        let player = Player::new(id, &username, spawn, &self.settings);
        state.players.push(player.clone());
        tracing::info!(session_id = %self.id, player_id = %id, username = %username, spawn = %spawn, "player joined");
        Ok(player)
    }

    /// Leave while WAITING. A roster left with one contender or none finishes
    /// the session.
    pub fn remove_player(&self, player_id: PlayerId, now: Instant) -> GameResult<()> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            self.remove_locked(&mut state, player_id, now, &mut events)
        };
        self.emit(events);
        result
    }

    fn remove_locked(
        &self,
        state: &mut SessionState,
        player_id: PlayerId,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> GameResult<()> {
        state.require(GameStatus::Waiting, "remove player")?;
        let idx = state.player_index(self.id, player_id)?;
        let player = state.players.remove(idx);
        if player.status == PlayerStatus::Alive {
            self.map.release(player.position);
        }
        tracing::info!(session_id = %self.id, player_id = %player_id, "player left");

        if state.alive_count() <= 1 {
            state.transition(GameStatus::Finished, "finish", now, events)?;
            self.on_finished(state);
        }
        Ok(())
    }

    /// Connection lost. Removes the player while WAITING, otherwise marks them
    /// DISCONNECTED, frees their cell and re-checks the win condition.
    pub fn disconnect_player(&self, player_id: PlayerId, now: Instant) -> GameResult<()> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            if state.status == GameStatus::Waiting {
                self.remove_locked(&mut state, player_id, now, &mut events)
            } else {
                let idx = state.player_index(self.id, player_id)?;
                let player = &mut state.players[idx];
                if player.status == PlayerStatus::Alive {
                    self.map.release(player.position);
                }
                player.status = PlayerStatus::Disconnected;
                player.respawn_at = None;
                tracing::info!(session_id = %self.id, player_id = %player_id, "player disconnected");
                self.check_win(&mut state, now, &mut events);
                Ok(())
            }
        };
        self.emit(events);
        result
    }

    // --- Lifecycle ---

    /// WAITING -> STARTING (countdown before `start`).
    pub fn prepare(&self, now: Instant) -> GameResult<()> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            state.require(GameStatus::Waiting, "prepare")?;
            state.transition(GameStatus::Starting, "prepare", now, &mut events)
        };
        self.emit(events);
        result
    }

    /// Begin play. Needs at least two players; every ALIVE player is put back
    /// on their spawn point.
    pub fn start(&self, now: Instant) -> GameResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            if !matches!(state.status, GameStatus::Waiting | GameStatus::Starting) {
                return Err(GameError::InvalidState {
                    action: "start",
                    status: state.status,
                });
            }
            let contenders = state.alive_count();
            if contenders < MIN_PLAYERS {
                return Err(GameError::NotEnoughPlayers {
                    required: MIN_PLAYERS,
                    actual: contenders,
                });
            }

            for p in state.players.iter_mut().filter(|p| p.status == PlayerStatus::Alive) {
                let from = p.position;
                self.map.release(from);
                if self.map.try_occupy(p.spawn_point, false) {
                    p.relocate(p.spawn_point);
                    p.prune_effects(now);
                } else {
                    self.map.try_occupy(from, true);
                }
            }

            state.started_at = Some(now);
            state.ended_at = None;
            state.transition(GameStatus::InProgress, "start", now, &mut events)?;
            tracing::info!(session_id = %self.id, players = state.players.len(), "session started");
        }
        self.emit(events);
        Ok(())
    }

    pub fn pause(&self, now: Instant) -> GameResult<()> {
        self.simple_transition(GameStatus::InProgress, GameStatus::Paused, "pause", now)
    }

    pub fn resume(&self, now: Instant) -> GameResult<()> {
        self.simple_transition(GameStatus::Paused, GameStatus::InProgress, "resume", now)
    }

    /// Force the session to FINISHED from any live state.
    pub fn end(&self, now: Instant) -> GameResult<()> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            let r = state.transition(GameStatus::Finished, "end", now, &mut events);
            if r.is_ok() {
                self.on_finished(&state);
            }
            r
        };
        self.emit(events);
        result
    }

    fn simple_transition(
        &self,
        from: GameStatus,
        to: GameStatus,
        action: &'static str,
        now: Instant,
    ) -> GameResult<()> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            state
                .require(from, action)
                .and_then(|_| state.transition(to, action, now, &mut events))
        };
        if result.is_ok() {
            tracing::info!(session_id = %self.id, status = %to, "session {action}d");
        }
        self.emit(events);
        result
    }

    // --- Player actions ---

    /// Step one cell. The destination is claimed before the origin is freed,
    /// both under the session write lock.
    pub fn move_player(
        &self,
        player_id: PlayerId,
        direction: Direction,
        now: Instant,
    ) -> GameResult<MoveOutcome> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            self.move_locked(&mut state, player_id, direction, now, &mut events)
        };
        self.emit(events);
        result
    }

    fn move_locked(
        &self,
        state: &mut SessionState,
        player_id: PlayerId,
        direction: Direction,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> GameResult<MoveOutcome> {
        state.require(GameStatus::InProgress, "move")?;
        let idx = state.player_index(self.id, player_id)?;
        let player = &state.players[idx];
        let from = player.position;
        let target = from.step(direction);

        if !player.can_move() {
            return Err(GameError::InvalidMove {
                player_id,
                target,
                reason: format!("player is {}", player.status),
            });
        }
        if !self.map.in_bounds(target) {
            return Err(GameError::InvalidMove {
                player_id,
                target,
                reason: "out of bounds".into(),
            });
        }
        if !self.map.try_occupy(target, false) {
            return Err(GameError::InvalidMove {
                player_id,
                target,
                reason: "cell is blocked".into(),
            });
        }
        self.map.release(from);
        state.players[idx].relocate(target);

        let collected = state
            .power_ups
            .iter()
            .position(|p| p.position == target && !p.is_expired(now))
            .map(|pu_idx| self.apply_power_up(state, idx, pu_idx, now, events));

        Ok(MoveOutcome {
            position: target,
            collected,
        })
    }

    /// Drop a bomb on the player's own cell and register it as PLACED.
    /// Arming the fuse timer is up to the caller.
    pub fn place_bomb(&self, player_id: PlayerId, pos: GridPos, now: Instant) -> GameResult<Bomb> {
        let mut state = self.write();
        state.require(GameStatus::InProgress, "place bomb")?;
        let idx = state.player_index(self.id, player_id)?;
        let player = &state.players[idx];

        let reject = |reason: String| GameError::BombPlacement {
            player_id,
            position: pos,
            reason,
        };
        if player.status != PlayerStatus::Alive {
            return Err(reject(format!("player is {}", player.status)));
        }
        if player.position != pos {
            return Err(reject(format!("player is at {}", player.position)));
        }
        let active = state
            .bombs
            .iter()
            .filter(|b| b.owner_id == player_id && b.state() == BombState::Placed)
            .count();
        if !player.can_place_bomb(active) {
            return Err(reject(format!("bomb limit of {} reached", player.bomb_count)));
        }

        let bomb = Bomb::new(
            player_id,
            pos,
            player.bomb_range,
            Duration::from_millis(self.settings.fuse_ms),
            now,
        )?;
        if !self.map.try_mark_bomb(pos) {
            return Err(reject("tile already has a bomb".into()));
        }
        state.bombs.push(bomb.clone());

        metrics::BOMBS_PLACED_TOTAL.inc();
        tracing::info!(session_id = %self.id, player_id = %player_id, bomb_id = %bomb.id, position = %pos, range = bomb.range, "bomb placed");
        Ok(bomb)
    }

    /// Explode a PLACED bomb whose fuse has run out.
    pub fn detonate(&self, bomb_id: BombId, now: Instant) -> GameResult<DetonationReport> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            state.require(GameStatus::InProgress, "explode bomb").and_then(|_| {
                let idx = state
                    .bombs
                    .iter()
                    .position(|b| b.id == bomb_id)
                    .ok_or(GameError::BombNotFound(bomb_id))?;
                if !state.bombs[idx].is_ready(now) {
                    return Err(GameError::BombNotArmed {
                        bomb_id,
                        reason: "fuse still burning".into(),
                    });
                }
                self.detonate_locked(&mut state, idx, now, &mut events)
            })
        };
        self.emit(events);
        result
    }

    fn detonate_locked(
        &self,
        state: &mut SessionState,
        idx: usize,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> GameResult<DetonationReport> {
        state.bombs[idx].ignite()?;
        let mut bomb = state.bombs.remove(idx);

        let blast = explosion::propagate(&self.map, bomb.position, bomb.range);
        let hits = explosion::apply_damage(
            &mut state.players,
            &blast.tiles,
            self.settings.explosion_damage,
            now,
        );

        let mut killed = Vec::new();
        let mut kill_events = Vec::new();
        for hit in &hits {
            match hit.outcome {
                HitOutcome::Died { eliminated } => {
                    self.map.release(hit.position);
                    let killer_id = (bomb.owner_id != hit.player_id).then_some(bomb.owner_id);
                    if let Some(owner) = killer_id.and_then(|k| state.players.iter_mut().find(|p| p.id == k)) {
                        owner.increment_kills();
                    }
                    metrics::PLAYERS_KILLED_TOTAL.inc();
                    tracing::info!(session_id = %self.id, victim_id = %hit.player_id, killer_id = ?killer_id, eliminated, "player killed");
                    killed.push(hit.player_id);
                    kill_events.push(GameEvent::PlayerKilled {
                        killer_id,
                        victim_id: hit.player_id,
                    });
                }
                HitOutcome::ShieldConsumed => {
                    tracing::debug!(session_id = %self.id, player_id = %hit.player_id, "shield absorbed blast");
                }
                HitOutcome::Unaffected => {}
            }
        }

        bomb.settle()?;
        self.map.mark_bomb(bomb.position, false);
        state.explosions.push(Explosion::new(
            bomb.id,
            bomb.position,
            blast.tiles.clone(),
            Duration::from_millis(self.settings.explosion_duration_ms),
            self.settings.explosion_damage,
            now,
        ));

        let affected_players: Vec<PlayerId> = hits.iter().map(|h| h.player_id).collect();
        metrics::BOMBS_EXPLODED_TOTAL.inc();
        tracing::info!(
            session_id = %self.id,
            bomb_id = %bomb.id,
            tiles = blast.tiles.len(),
            players = affected_players.len(),
            walls = blast.destroyed_walls.len(),
            "bomb exploded"
        );

        events.push(GameEvent::BombExploded {
            bomb_id: bomb.id,
            affected_tiles: blast.tiles.clone(),
            affected_players: affected_players.clone(),
        });
        events.extend(kill_events);
        self.check_win(state, now, events);

        Ok(DetonationReport {
            bomb_id: bomb.id,
            owner_id: bomb.owner_id,
            origin: bomb.position,
            affected_tiles: blast.tiles,
            affected_players,
            killed,
            destroyed_walls: blast.destroyed_walls,
        })
    }

    // --- Power-ups ---

    /// Put a power-up on an empty floor cell.
    pub fn add_power_up(&self, power_up: PowerUp) -> GameResult<()> {
        if self.is_closed() {
            return Err(GameError::SessionNotFound(self.id));
        }
        let mut state = self.write();
        if state.status == GameStatus::Finished {
            return Err(GameError::InvalidState {
                action: "spawn power-up",
                status: state.status,
            });
        }
        match self.map.tile_type(power_up.position) {
            None => return Err(GameError::validation("position", "out of bounds")),
            Some(t) if !t.can_spawn_power_up() => {
                return Err(GameError::validation("position", "not an empty floor tile"))
            }
            Some(_) => {}
        }
        if state.power_ups.iter().any(|p| p.position == power_up.position) {
            return Err(GameError::validation("position", "cell already holds a power-up"));
        }

        metrics::POWERUPS_SPAWNED_TOTAL
            .with_label_values(&[power_up.power_up_type.as_str()])
            .inc();
        tracing::debug!(session_id = %self.id, power_up_id = %power_up.id, kind = %power_up.power_up_type, position = %power_up.position, "power-up spawned");
        state.power_ups.push(power_up);
        Ok(())
    }

    /// Pick up a power-up the player is standing on.
    pub fn collect_power_up(
        &self,
        player_id: PlayerId,
        power_up_id: PowerUpId,
        now: Instant,
    ) -> GameResult<PowerUpEffect> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.write();
            self.collect_locked(&mut state, player_id, power_up_id, now, &mut events)
        };
        self.emit(events);
        result
    }

    fn collect_locked(
        &self,
        state: &mut SessionState,
        player_id: PlayerId,
        power_up_id: PowerUpId,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> GameResult<PowerUpEffect> {
        state.require(GameStatus::InProgress, "collect power-up")?;
        let idx = state.player_index(self.id, player_id)?;
        let pu_idx = state
            .power_ups
            .iter()
            .position(|p| p.id == power_up_id)
            .ok_or(GameError::PowerUpNotFound {
                session_id: self.id,
                power_up_id,
            })?;

        if state.power_ups[pu_idx].is_expired(now) {
            state.power_ups.remove(pu_idx);
            return Err(GameError::PowerUpExpired(power_up_id));
        }
        let player = &state.players[idx];
        if player.status != PlayerStatus::Alive || player.position != state.power_ups[pu_idx].position {
            return Err(GameError::PowerUpOutOfReach {
                player_id,
                power_up_id,
            });
        }
        Ok(self.apply_power_up(state, idx, pu_idx, now, events))
    }

    fn apply_power_up(
        &self,
        state: &mut SessionState,
        idx: usize,
        pu_idx: usize,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> PowerUpEffect {
        let power_up = state.power_ups.remove(pu_idx);
        let effect = power_up.effect();
        let player = &mut state.players[idx];
        player.apply_effect(&effect, now);

        metrics::POWERUPS_COLLECTED_TOTAL
            .with_label_values(&[effect.power_up_type.as_str()])
            .inc();
        tracing::info!(session_id = %self.id, player_id = %player.id, power_up_id = %power_up.id, kind = %effect.power_up_type, "power-up collected");
        events.push(GameEvent::PowerUpCollected {
            player_id: player.id,
            power_up_id: power_up.id,
            effect,
        });
        effect
    }

    /// Remove a power-up whose time is up. False if it is gone or still live.
    pub fn expire_power_up(&self, power_up_id: PowerUpId, now: Instant) -> bool {
        let mut state = self.write();
        match state
            .power_ups
            .iter()
            .position(|p| p.id == power_up_id && p.is_expired(now))
        {
            Some(i) => {
                state.power_ups.remove(i);
                true
            }
            None => false,
        }
    }

    // --- Tick ---

    /// Periodic sweep. No-op unless IN_PROGRESS.
    ///
    /// Detonates bombs whose fuse ran out, clears finished explosions and
    /// expired power-ups, drops stale shields, respawns players whose delay is
    /// over, then evaluates the win condition.
    pub fn update(&self, now: Instant) -> TickReport {
        let mut events = Vec::new();
        let mut report = TickReport::default();
        {
            let mut state = self.write();
            if state.status != GameStatus::InProgress {
                return report;
            }

            while state.status == GameStatus::InProgress {
                let Some(idx) = state
                    .bombs
                    .iter()
                    .position(|b| b.state() == BombState::Placed && b.is_ready(now))
                else {
                    break;
                };
                match self.detonate_locked(&mut state, idx, now, &mut events) {
                    Ok(r) => report.detonations.push(r),
                    Err(e) => {
                        tracing::warn!(session_id = %self.id, error = %e, "dropping bomb that failed to explode");
                        state.bombs.remove(idx);
                    }
                }
            }

            let before = state.explosions.len();
            state.explosions.retain(|e| !e.is_expired(now));
            report.cleared_explosions = before - state.explosions.len();

            let before = state.power_ups.len();
            state.power_ups.retain(|p| !p.is_expired(now));
            report.expired_power_ups = before - state.power_ups.len();

            for p in state.players.iter_mut() {
                p.prune_effects(now);
                if p.ready_to_respawn(now) && self.map.try_occupy(p.spawn_point, false) {
                    match p.respawn(now) {
                        Ok(()) => {
                            tracing::debug!(session_id = %self.id, player_id = %p.id, "player respawned");
                            report.respawned.push(p.id);
                        }
                        Err(_) => self.map.release(p.spawn_point),
                    }
                }
            }

            report.finished = self.check_win(&mut state, now, &mut events);
        }
        self.emit(events);
        report
    }

    /// FINISHED once at most one contender is left. Returns true if this call finished it.
    fn check_win(
        &self,
        state: &mut SessionState,
        now: Instant,
        events: &mut Vec<GameEvent>,
    ) -> bool {
        if !matches!(state.status, GameStatus::InProgress | GameStatus::Paused) {
            return false;
        }
        if state.alive_count() > 1 {
            return false;
        }
        if state
            .transition(GameStatus::Finished, "finish", now, events)
            .is_err()
        {
            return false;
        }
        self.on_finished(state);
        true
    }

    fn on_finished(&self, state: &SessionState) {
        let winner = state.players.iter().find(|p| p.in_contention()).map(|p| p.id);
        if let (Some(start), Some(end)) = (state.started_at, state.ended_at) {
            metrics::SESSION_DURATION_SECONDS.observe(end.saturating_duration_since(start).as_secs_f64());
        }
        tracing::info!(session_id = %self.id, winner_id = ?winner, "session finished");
    }
}
