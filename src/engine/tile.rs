use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TileType {
    Empty,
    SolidWall,
    DestructibleWall,
    SpawnPoint,
}

impl TileType {
    /// Only floor tiles can be stood on.
    pub fn is_walkable(self) -> bool {
        matches!(self, TileType::Empty | TileType::SpawnPoint)
    }

    pub fn is_destructible(self) -> bool {
        self == TileType::DestructibleWall
    }

    pub fn can_spawn_power_up(self) -> bool {
        self == TileType::Empty
    }

    /// Whether an explosion ray may enter this tile at all.
    pub fn allows_explosion(self) -> bool {
        self != TileType::SolidWall
    }
}

/// One grid cell. Guarded by its own mutex inside [`GameMap`](super::map::GameMap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub tile_type: TileType,
    pub occupied: bool,
    pub has_bomb: bool,
}

impl Tile {
    pub fn new(tile_type: TileType) -> Self {
        Tile {
            tile_type,
            occupied: false,
            has_bomb: false,
        }
    }

    /// Occupancy gate: the tile must be floor, unclaimed by a player, and either
    /// bomb-free or the caller explicitly tolerates a bomb.
    pub fn can_occupy(&self, allow_if_bomb: bool) -> bool {
        self.tile_type.is_walkable() && !self.occupied && (!self.has_bomb || allow_if_bomb)
    }

    /// Turn a destructible wall into floor. Returns false for any other tile.
    pub fn destroy(&mut self) -> bool {
        if !self.tile_type.is_destructible() {
            return false;
        }
        self.tile_type = TileType::Empty;
        self.occupied = false;
        self.has_bomb = false;
        true
    }
}

impl Default for Tile {
    fn default() -> Self {
        Tile::new(TileType::SolidWall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_predicates() {
        assert!(TileType::Empty.is_walkable());
        assert!(TileType::SpawnPoint.is_walkable());
        assert!(!TileType::SolidWall.is_walkable());
        assert!(!TileType::DestructibleWall.is_walkable());

        assert!(TileType::DestructibleWall.is_destructible());
        assert!(!TileType::SolidWall.is_destructible());

        assert!(TileType::Empty.can_spawn_power_up());
        assert!(!TileType::SpawnPoint.can_spawn_power_up());

        assert!(!TileType::SolidWall.allows_explosion());
        assert!(TileType::DestructibleWall.allows_explosion());
    }

    #[test]
    fn test_can_occupy() {
        let mut t = Tile::new(TileType::Empty);
        assert!(t.can_occupy(false));
        t.has_bomb = true;
        assert!(!t.can_occupy(false));
        assert!(t.can_occupy(true));
        t.occupied = true;
        assert!(!t.can_occupy(true));
        assert!(!Tile::new(TileType::SolidWall).can_occupy(true));
    }

    #[test]
    fn test_destroy_only_affects_destructible_walls() {
        let mut solid = Tile::new(TileType::SolidWall);
        assert!(!solid.destroy());
        assert_eq!(solid.tile_type, TileType::SolidWall);

        let mut rubble = Tile::new(TileType::DestructibleWall);
        assert!(rubble.destroy());
        assert_eq!(rubble.tile_type, TileType::Empty);
        assert!(!rubble.destroy());
    }
}
