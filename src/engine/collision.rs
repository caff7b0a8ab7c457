use std::sync::Arc;

use super::geometry::GridPos;
use super::occupancy::TileRegistry;
use super::SessionId;

/// Read-only movement checks against the tile registry.
pub struct CollisionValidator {
    tiles: Arc<TileRegistry>,
}

impl CollisionValidator {
    pub fn new(tiles: Arc<TileRegistry>) -> Self {
        CollisionValidator { tiles }
    }

    /// True iff `pos` is in bounds, walkable, unclaimed and bomb-free.
    /// Unknown sessions answer false.
    pub fn can_move_to(&self, session_id: &SessionId, pos: GridPos) -> bool {
        let Some(map) = self.tiles.get(session_id) else {
            return false;
        };
        map.tile(pos)
            .is_some_and(|t| t.tile_type.is_walkable() && !t.occupied && !t.has_bomb)
    }

    pub fn is_in_bounds(&self, session_id: &SessionId, pos: GridPos) -> bool {
        self.tiles
            .get(session_id)
            .is_some_and(|m| m.in_bounds(pos))
    }
}
