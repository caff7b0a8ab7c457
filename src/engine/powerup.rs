use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::EngineSettings;
use super::entity::Entity;
use super::error::GameResult;
use super::geometry::GridPos;
use super::session::GameSession;
use super::{PlayerId, PowerUpId};
use crate::worker_pool::TimerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerUpType {
    ExtraLife,
    SpeedUp,
    BombCountUp,
    BombRangeUp,
    TemporaryShield,
}

impl PowerUpType {
    pub const ALL: [PowerUpType; 5] = [
        PowerUpType::ExtraLife,
        PowerUpType::SpeedUp,
        PowerUpType::BombCountUp,
        PowerUpType::BombRangeUp,
        PowerUpType::TemporaryShield,
    ];

    /// Effect wears off after a while instead of changing stats for good.
    pub fn is_temporary(self) -> bool {
        self == PowerUpType::TemporaryShield
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PowerUpType::ExtraLife => "EXTRA_LIFE",
            PowerUpType::SpeedUp => "SPEED_UP",
            PowerUpType::BombCountUp => "BOMB_COUNT_UP",
            PowerUpType::BombRangeUp => "BOMB_RANGE_UP",
            PowerUpType::TemporaryShield => "TEMPORARY_SHIELD",
        }
    }
}

impl fmt::Display for PowerUpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a player gains from picking up a power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUpEffect {
    #[serde(rename = "type")]
    pub power_up_type: PowerUpType,
    pub value: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PowerUp {
    pub id: PowerUpId,
    pub position: GridPos,
    pub power_up_type: PowerUpType,
    pub value: u32,
    pub spawned_at: Instant,
    pub duration: Duration,
    /// How long a temporary effect lasts once collected.
    pub effect_duration: Option<Duration>,
}

impl PowerUp {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.spawned_at) >= self.duration
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.spawned_at))
    }

    pub fn effect(&self) -> PowerUpEffect {
        PowerUpEffect {
            power_up_type: self.power_up_type,
            value: self.value,
            duration_ms: self.effect_duration.map(|d| d.as_millis() as u64),
        }
    }
}

impl Entity for PowerUp {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> GridPos {
        self.position
    }
}

/// Spawns timed power-ups, arms their expiry, and rolls wall drops.
///
/// Owns its own seedable RNG so drop sequences are reproducible.
pub struct PowerUpLifecycle {
    timers: Arc<TimerPool>,
    rng: Mutex<StdRng>,
    duration: Duration,
    value: u32,
    shield_duration: Duration,
    drop_rate: f64,
}

impl PowerUpLifecycle {
    pub fn new(timers: Arc<TimerPool>, settings: &EngineSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        PowerUpLifecycle {
            timers,
            rng: Mutex::new(rng),
            duration: Duration::from_millis(settings.power_up_duration_ms),
            value: settings.power_up_value,
            shield_duration: Duration::from_millis(settings.shield_duration_ms),
            drop_rate: settings.drop_rate,
        }
    }

    /// Build an unregistered power-up with this lifecycle's defaults.
    pub fn build(&self, power_up_type: PowerUpType, position: GridPos, now: Instant) -> PowerUp {
        PowerUp {
            id: Uuid::new_v4(),
            position,
            power_up_type,
            value: self.value,
            spawned_at: now,
            duration: self.duration,
            effect_duration: power_up_type
                .is_temporary()
                .then_some(self.shield_duration),
        }
    }

    pub fn spawn(
        &self,
        session: &Arc<GameSession>,
        power_up_type: PowerUpType,
        position: GridPos,
    ) -> GameResult<PowerUp> {
        let power_up = self.build(power_up_type, position, Instant::now());
        session.add_power_up(power_up.clone())?;
        self.arm_expiry(session, &power_up);
        Ok(power_up)
    }

    pub fn collect(
        &self,
        session: &GameSession,
        player_id: PlayerId,
        power_up_id: PowerUpId,
    ) -> GameResult<PowerUpEffect> {
        session.collect_power_up(player_id, power_up_id, Instant::now())
    }

    pub fn random_type(&self) -> PowerUpType {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        PowerUpType::ALL[rng.gen_range(0..PowerUpType::ALL.len())]
    }

    /// Roll once per destroyed wall; each hit spawns a random power-up on that cell.
    pub fn roll_drops(&self, session: &Arc<GameSession>, walls: &[GridPos]) -> Vec<PowerUp> {
        let picks: Vec<(GridPos, PowerUpType)> = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            walls
                .iter()
                .filter_map(|&pos| {
                    if rng.gen::<f64>() < self.drop_rate {
                        let t = PowerUpType::ALL[rng.gen_range(0..PowerUpType::ALL.len())];
                        Some((pos, t))
                    } else {
                        None
                    }
                })
                .collect()
        };

        let mut spawned = Vec::new();
        for (pos, t) in picks {
            match self.spawn(session, t, pos) {
                Ok(p) => spawned.push(p),
                Err(e) => {
                    tracing::debug!(session_id = %session.id, position = %pos, error = %e, "power-up drop skipped")
                }
            }
        }
        spawned
    }

    fn arm_expiry(&self, session: &Arc<GameSession>, power_up: &PowerUp) {
        let weak = Arc::downgrade(session);
        let id = power_up.id;
        self.timers
            .schedule("power_up_expiry", power_up.duration, move || {
                on_expiry(&weak, id);
                Ok(())
            });
    }
}

fn on_expiry(session: &Weak<GameSession>, power_up_id: PowerUpId) {
    let Some(session) = session.upgrade() else {
        return;
    };
    if session.is_closed() {
        return;
    }
    if session.expire_power_up(power_up_id, Instant::now()) {
        tracing::debug!(session_id = %session.id, power_up_id = %power_up_id, "power-up expired");
    }
}
