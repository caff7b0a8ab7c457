use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::config::{EngineSettings, USERNAME_MAX_LEN, USERNAME_MIN_LEN};
use super::entity::{Damageable, Entity, HitOutcome, Movable};
use super::error::{GameError, GameResult};
use super::geometry::GridPos;
use super::powerup::{PowerUpEffect, PowerUpType};
use super::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    Alive,
    /// Lost a life, waiting to respawn.
    Dead,
    /// Out of lives.
    Spectating,
    Disconnected,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerStatus::Alive => "ALIVE",
            PlayerStatus::Dead => "DEAD",
            PlayerStatus::Spectating => "SPECTATING",
            PlayerStatus::Disconnected => "DISCONNECTED",
        };
        f.write_str(s)
    }
}

/// A timed effect currently held by a player.
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub power_up_type: PowerUpType,
    pub expires_at: Instant,
}

impl ActiveEffect {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub position: GridPos,
    pub spawn_point: GridPos,
    pub lives: u32,
    pub bomb_count: u32,
    pub bomb_range: u32,
    pub speed: u32,
    pub status: PlayerStatus,
    pub kills: u32,
    pub deaths: u32,
    pub active_effects: Vec<ActiveEffect>,
    pub respawn_at: Option<Instant>,
    respawn_delay: Duration,
}

impl Player {
    pub fn new(
        id: PlayerId,
        username: &str,
        spawn_point: GridPos,
        settings: &EngineSettings,
    ) -> Self {
        Player {
            id,
            username: username.to_string(),
            position: spawn_point,
            spawn_point,
            lives: settings.player_lives,
            bomb_count: settings.bomb_count,
            bomb_range: settings.bomb_range,
            speed: settings.player_speed,
            status: PlayerStatus::Alive,
            kills: 0,
            deaths: 0,
            active_effects: Vec::new(),
            respawn_at: None,
            respawn_delay: Duration::from_millis(settings.respawn_delay_ms),
        }
    }

    /// Trim and length-check a display name.
    pub fn validate_username(raw: &str) -> GameResult<String> {
        let name = raw.trim();
        let len = name.chars().count();
        if len < USERNAME_MIN_LEN || len > USERNAME_MAX_LEN {
            return Err(GameError::validation(
                "username",
                format!("must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"),
            ));
        }
        Ok(name.to_string())
    }

    /// Lives remain.
    pub fn is_alive(&self) -> bool {
        self.lives > self.deaths
    }

    /// Still counts towards the win condition.
    pub fn in_contention(&self) -> bool {
        self.is_alive() && self.status != PlayerStatus::Disconnected
    }

    pub fn remaining_lives(&self) -> u32 {
        self.lives.saturating_sub(self.deaths)
    }

    pub fn can_place_bomb(&self, active_bombs: usize) -> bool {
        self.status == PlayerStatus::Alive && active_bombs < self.bomb_count as usize
    }

    pub fn has_shield(&self, now: Instant) -> bool {
        self.active_effects
            .iter()
            .any(|e| e.power_up_type == PowerUpType::TemporaryShield && !e.is_expired(now))
    }

    /// Remove one live shield. Returns false if none was held.
    pub fn consume_shield(&mut self, now: Instant) -> bool {
        let idx = self
            .active_effects
            .iter()
            .position(|e| e.power_up_type == PowerUpType::TemporaryShield && !e.is_expired(now));
        match idx {
            Some(i) => {
                self.active_effects.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn prune_effects(&mut self, now: Instant) {
        self.active_effects.retain(|e| !e.is_expired(now));
    }

    pub fn apply_effect(&mut self, effect: &PowerUpEffect, now: Instant) {
        match effect.power_up_type {
            PowerUpType::ExtraLife => self.lives += effect.value,
            PowerUpType::SpeedUp => self.speed += effect.value,
            PowerUpType::BombCountUp => self.bomb_count += effect.value,
            PowerUpType::BombRangeUp => self.bomb_range += effect.value,
            PowerUpType::TemporaryShield => {
                let ms = effect.duration_ms.unwrap_or(0);
                self.active_effects.push(ActiveEffect {
                    power_up_type: PowerUpType::TemporaryShield,
                    expires_at: now + Duration::from_millis(ms),
                });
            }
        }
    }

    /// Record a death. Returns true when that was the last life.
    pub fn die(&mut self, now: Instant) -> bool {
        self.deaths += 1;
        if self.is_alive() {
            self.status = PlayerStatus::Dead;
            self.respawn_at = Some(now + self.respawn_delay);
            false
        } else {
            self.status = PlayerStatus::Spectating;
            self.respawn_at = None;
            self.active_effects.clear();
            true
        }
    }

    pub fn ready_to_respawn(&self, now: Instant) -> bool {
        self.status == PlayerStatus::Dead && self.respawn_at.is_some_and(|t| now >= t)
    }

    /// Move back to the spawn point and come back to life.
    /// The caller must already hold the spawn cell.
    pub fn respawn(&mut self, now: Instant) -> GameResult<()> {
        if !self.is_alive() {
            return Err(GameError::InvalidMove {
                player_id: self.id,
                target: self.spawn_point,
                reason: "no lives remaining".into(),
            });
        }
        self.position = self.spawn_point;
        self.status = PlayerStatus::Alive;
        self.respawn_at = None;
        self.prune_effects(now);
        Ok(())
    }

    pub fn increment_kills(&mut self) {
        self.kills += 1;
    }
}

impl Entity for Player {
    fn id(&self) -> uuid::Uuid {
        self.id
    }

    fn position(&self) -> GridPos {
        self.position
    }
}

impl Movable for Player {
    fn speed(&self) -> u32 {
        self.speed
    }

    fn can_move(&self) -> bool {
        self.status == PlayerStatus::Alive
    }

    fn relocate(&mut self, pos: GridPos) {
        self.position = pos;
    }
}

impl Damageable for Player {
    fn take_damage(&mut self, damage: u32, now: Instant) -> HitOutcome {
        if damage == 0 || self.status != PlayerStatus::Alive {
            return HitOutcome::Unaffected;
        }
        if self.consume_shield(now) {
            return HitOutcome::ShieldConsumed;
        }
        HitOutcome::Died {
            eliminated: self.die(now),
        }
    }

    fn is_destroyed(&self) -> bool {
        self.status == PlayerStatus::Spectating
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn player() -> Player {
        Player::new(Uuid::new_v4(), "dino", GridPos::new(1, 1), &EngineSettings::default())
    }

    fn shield() -> PowerUpEffect {
        PowerUpEffect {
            power_up_type: PowerUpType::TemporaryShield,
            value: 1,
            duration_ms: Some(5_000),
        }
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(Player::validate_username("  rex  ").unwrap(), "rex");
        assert!(Player::validate_username("ab").is_err());
        assert!(Player::validate_username(&"x".repeat(21)).is_err());
        assert!(Player::validate_username("   ").is_err());
    }

    #[test]
    fn test_alive_tracks_lives_minus_deaths() {
        let now = Instant::now();
        let mut p = player();
        assert!(p.is_alive());
        assert!(!p.die(now));
        assert_eq!(p.status, PlayerStatus::Dead);
        assert!(p.respawn_at.is_some());
        assert!(!p.die(now));
        assert!(p.die(now));
        assert_eq!(p.status, PlayerStatus::Spectating);
        assert!(!p.is_alive());
        assert_eq!(p.remaining_lives(), 0);
    }

    #[test]
    fn test_shield_absorbs_one_hit() {
        let now = Instant::now();
        let mut p = player();
        p.apply_effect(&shield(), now);
        assert!(p.has_shield(now));

        assert_eq!(p.take_damage(1, now), HitOutcome::ShieldConsumed);
        assert_eq!(p.deaths, 0);
        assert!(!p.has_shield(now));
        assert!(p.active_effects.is_empty());

        assert_eq!(p.take_damage(1, now), HitOutcome::Died { eliminated: false });
        assert_eq!(p.deaths, 1);
    }

    #[test]
    fn test_expired_shield_does_not_protect() {
        let now = Instant::now();
        let mut p = player();
        p.apply_effect(&shield(), now);
        let later = now + Duration::from_secs(6);
        assert!(!p.has_shield(later));
        assert_eq!(p.take_damage(1, later), HitOutcome::Died { eliminated: false });
    }

    #[test]
    fn test_dead_players_ignore_hits() {
        let now = Instant::now();
        let mut p = player();
        p.die(now);
        assert_eq!(p.take_damage(1, now), HitOutcome::Unaffected);
        assert_eq!(p.deaths, 1);
    }

    #[test]
    fn test_stat_effects() {
        let now = Instant::now();
        let mut p = player();
        for t in [
            PowerUpType::ExtraLife,
            PowerUpType::SpeedUp,
            PowerUpType::BombCountUp,
            PowerUpType::BombRangeUp,
        ] {
            p.apply_effect(
                &PowerUpEffect {
                    power_up_type: t,
                    value: 2,
                    duration_ms: None,
                },
                now,
            );
        }
        assert_eq!(p.lives, 5);
        assert_eq!(p.speed, 3);
        assert_eq!(p.bomb_count, 3);
        assert_eq!(p.bomb_range, 4);
    }

    #[test]
    fn test_respawn() {
        let now = Instant::now();
        let mut p = player();
        p.position = GridPos::new(4, 1);
        p.die(now);
        assert!(!p.ready_to_respawn(now));
        let later = now + Duration::from_millis(2000);
        assert!(p.ready_to_respawn(later));
        p.respawn(later).unwrap();
        assert_eq!(p.position, p.spawn_point);
        assert_eq!(p.status, PlayerStatus::Alive);
    }

    #[test]
    fn test_bomb_capacity() {
        let mut p = player();
        assert!(p.can_place_bomb(0));
        assert!(!p.can_place_bomb(1));
        p.status = PlayerStatus::Dead;
        assert!(!p.can_place_bomb(0));
    }
}
