use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::MIN_FUSE_MS;
use super::entity::Entity;
use super::error::{ErrorKind, GameError, GameResult};
use super::geometry::GridPos;
use super::powerup::PowerUpLifecycle;
use super::session::{DetonationReport, GameSession, GameStatus};
use super::{BombId, PlayerId};
use crate::worker_pool::TimerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BombState {
    Placed,
    Exploding,
    Exploded,
}

impl fmt::Display for BombState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BombState::Placed => "PLACED",
            BombState::Exploding => "EXPLODING",
            BombState::Exploded => "EXPLODED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Bomb {
    pub id: BombId,
    pub owner_id: PlayerId,
    pub position: GridPos,
    pub range: u32,
    pub placed_at: Instant,
    pub fuse: Duration,
    state: BombState,
}

impl Bomb {
    pub fn new(
        owner_id: PlayerId,
        position: GridPos,
        range: u32,
        fuse: Duration,
        now: Instant,
    ) -> GameResult<Self> {
        if fuse < Duration::from_millis(MIN_FUSE_MS) {
            return Err(GameError::validation(
                "fuse",
                format!("must be at least {MIN_FUSE_MS} ms"),
            ));
        }
        if range == 0 {
            return Err(GameError::validation("range", "must be at least 1"));
        }
        Ok(Bomb {
            id: Uuid::new_v4(),
            owner_id,
            position,
            range,
            placed_at: now,
            fuse,
            state: BombState::Placed,
        })
    }

    pub fn state(&self) -> BombState {
        self.state
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.placed_at) >= self.fuse
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.fuse
            .saturating_sub(now.saturating_duration_since(self.placed_at))
    }

    /// PLACED -> EXPLODING. Any other starting state is rejected.
    pub fn ignite(&mut self) -> GameResult<()> {
        if self.state != BombState::Placed {
            return Err(GameError::BombNotArmed {
                bomb_id: self.id,
                reason: format!("bomb is {}", self.state),
            });
        }
        self.state = BombState::Exploding;
        Ok(())
    }

    /// EXPLODING -> EXPLODED.
    pub fn settle(&mut self) -> GameResult<()> {
        if self.state != BombState::Exploding {
            return Err(GameError::BombNotArmed {
                bomb_id: self.id,
                reason: format!("bomb is {}", self.state),
            });
        }
        self.state = BombState::Exploded;
        Ok(())
    }
}

impl Entity for Bomb {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> GridPos {
        self.position
    }
}

/// Places bombs and arms their fuse timers on the shared timer pool.
pub struct BombLifecycle {
    timers: Arc<TimerPool>,
    power_ups: Arc<PowerUpLifecycle>,
}

impl BombLifecycle {
    pub fn new(timers: Arc<TimerPool>, power_ups: Arc<PowerUpLifecycle>) -> Self {
        BombLifecycle { timers, power_ups }
    }

    pub fn place(
        &self,
        session: &Arc<GameSession>,
        player_id: PlayerId,
        pos: GridPos,
    ) -> GameResult<Bomb> {
        let bomb = session.place_bomb(player_id, pos, Instant::now())?;
        self.arm(session, &bomb);
        Ok(bomb)
    }

    /// Detonate now. The fuse must already have run out.
    pub fn explode(
        &self,
        session: &Arc<GameSession>,
        bomb_id: BombId,
    ) -> GameResult<DetonationReport> {
        let report = session.detonate(bomb_id, Instant::now())?;
        self.power_ups.roll_drops(session, &report.destroyed_walls);
        Ok(report)
    }

    fn arm(&self, session: &Arc<GameSession>, bomb: &Bomb) {
        let weak = Arc::downgrade(session);
        let power_ups = self.power_ups.clone();
        let bomb_id = bomb.id;
        let armed = self
            .timers
            .schedule("bomb_fuse", bomb.fuse, move || on_fuse(&weak, bomb_id, &power_ups));
        if !armed {
            // update() still sweeps the bomb once its fuse has run out
            tracing::warn!(session_id = %session.id, bomb_id = %bomb_id, "fuse timer rejected, relying on tick sweep");
        }
    }
}

/// Timer entry point. Vanished sessions and bombs that were already swept are no-ops.
fn on_fuse(
    session: &Weak<GameSession>,
    bomb_id: BombId,
    power_ups: &PowerUpLifecycle,
) -> GameResult<()> {
    let Some(session) = session.upgrade() else {
        tracing::debug!(bomb_id = %bomb_id, "fuse fired after session teardown");
        return Ok(());
    };
    if session.is_closed() || session.status() != GameStatus::InProgress {
        tracing::debug!(session_id = %session.id, bomb_id = %bomb_id, "fuse fired outside play, leaving bomb to tick sweep");
        return Ok(());
    }
    match session.detonate(bomb_id, Instant::now()) {
        Ok(report) => {
            power_ups.roll_drops(&session, &report.destroyed_walls);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(GameError::InvalidState { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
