// Capability traits shared by grid entities.

use std::time::Instant;

use uuid::Uuid;

use super::geometry::GridPos;

/// Anything that lives on one grid cell.
pub trait Entity {
    fn id(&self) -> Uuid;
    fn position(&self) -> GridPos;
}

pub trait Movable: Entity {
    fn speed(&self) -> u32;
    /// Whether the entity may currently change cells.
    fn can_move(&self) -> bool;
    /// Commit a new cell. Occupancy bookkeeping is the caller's job.
    fn relocate(&mut self, pos: GridPos);
}

/// Result of applying one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Not a valid target right now.
    Unaffected,
    /// A shield absorbed the hit and was used up.
    ShieldConsumed,
    /// Lost a life. `eliminated` is set when no lives remain.
    Died { eliminated: bool },
}

pub trait Damageable: Entity {
    fn take_damage(&mut self, damage: u32, now: Instant) -> HitOutcome;
    /// Permanently out of play.
    fn is_destroyed(&self) -> bool;
}
