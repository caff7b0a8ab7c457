use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::geometry::GridPos;
use super::map::GameMap;
use super::SessionId;

/// Session-keyed lookup of tile grids.
///
/// Each session's grid is an independent `Arc<GameMap>` with per-cell locks,
/// so occupancy changes in one session never contend with another. The
/// registry lock only guards the mapping itself.
#[derive(Default)]
pub struct TileRegistry {
    maps: RwLock<HashMap<SessionId, Arc<GameMap>>>,
}

impl TileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grid. Returns false if the session already had one.
    pub fn insert(&self, session_id: SessionId, map: Arc<GameMap>) -> bool {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if maps.contains_key(&session_id) {
            return false;
        }
        maps.insert(session_id, map);
        true
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<GameMap>> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<GameMap>> {
        self.maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.maps.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim a cell. Unknown sessions and out-of-bounds cells simply lose.
    pub fn try_occupy(&self, session_id: &SessionId, pos: GridPos, allow_if_bomb: bool) -> bool {
        self.get(session_id)
            .is_some_and(|m| m.try_occupy(pos, allow_if_bomb))
    }

    pub fn release(&self, session_id: &SessionId, pos: GridPos) {
        if let Some(m) = self.get(session_id) {
            m.release(pos);
        }
    }

    pub fn mark_bomb(&self, session_id: &SessionId, pos: GridPos, present: bool) {
        if let Some(m) = self.get(session_id) {
            m.mark_bomb(pos, present);
        }
    }
}
