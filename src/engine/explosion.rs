use std::time::{Duration, Instant};

use uuid::Uuid;

use super::entity::{Damageable, Entity, HitOutcome};
use super::geometry::{Direction, GridPos};
use super::map::GameMap;
use super::player::Player;
use super::{BombId, PlayerId};

/// Transient blast left on the grid for a short time after a bomb goes off.
#[derive(Debug, Clone)]
pub struct Explosion {
    pub id: Uuid,
    pub bomb_id: BombId,
    pub origin: GridPos,
    pub affected_tiles: Vec<GridPos>,
    pub created_at: Instant,
    pub duration: Duration,
    pub damage: u32,
}

impl Explosion {
    pub fn new(
        bomb_id: BombId,
        origin: GridPos,
        affected_tiles: Vec<GridPos>,
        duration: Duration,
        damage: u32,
        now: Instant,
    ) -> Self {
        Explosion {
            id: Uuid::new_v4(),
            bomb_id,
            origin,
            affected_tiles,
            created_at: now,
            duration,
            damage,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.duration
    }

    pub fn affects(&self, pos: GridPos) -> bool {
        self.affected_tiles.contains(&pos)
    }
}

impl Entity for Explosion {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> GridPos {
        self.origin
    }
}

/// Cells reached by one blast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blast {
    /// Origin first, then each ray outward in `Direction::ALL` order.
    pub tiles: Vec<GridPos>,
    /// Rubble removed by this blast.
    pub destroyed_walls: Vec<GridPos>,
}

/// Cast the four rays from `origin`.
///
/// Each ray walks up to `range` cells. It stops before leaving the map or
/// entering a solid wall. A destructible wall is included, destroyed, and ends
/// the ray. Rays are independent of each other.
pub fn propagate(map: &GameMap, origin: GridPos, range: u32) -> Blast {
    let mut blast = Blast {
        tiles: vec![origin],
        destroyed_walls: Vec::new(),
    };

    for direction in Direction::ALL {
        for step in 1..=range as i32 {
            let pos = origin.offset(direction, step);
            let Some(tile_type) = map.tile_type(pos) else {
                break;
            };
            if !tile_type.allows_explosion() {
                break;
            }
            blast.tiles.push(pos);
            if tile_type.is_destructible() {
                if map.destroy_wall(pos) {
                    blast.destroyed_walls.push(pos);
                }
                break;
            }
        }
    }

    blast
}

/// One player caught in a blast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub player_id: PlayerId,
    pub position: GridPos,
    pub outcome: HitOutcome,
}

/// Hit every ALIVE player standing on an affected cell.
pub fn apply_damage(
    players: &mut [Player],
    tiles: &[GridPos],
    damage: u32,
    now: Instant,
) -> Vec<Hit> {
    players
        .iter_mut()
        .filter(|p| tiles.contains(&p.position()))
        .filter_map(|p| {
            let position = p.position();
            match p.take_damage(damage, now) {
                HitOutcome::Unaffected => None,
                outcome => Some(Hit {
                    player_id: p.id,
                    position,
                    outcome,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::EngineSettings;
    use crate::engine::powerup::{PowerUpEffect, PowerUpType};
    use crate::engine::tile::TileType;

    /// 9x9 walled box, interior floor, with the given overrides.
    fn arena(overrides: &[(i32, i32, TileType)]) -> GameMap {
        let (w, h) = (9usize, 9usize);
        let mut types = vec![TileType::Empty; w * h];
        for y in 0..h {
            for x in 0..w {
                if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                    types[y * w + x] = TileType::SolidWall;
                }
            }
        }
        for &(x, y, t) in overrides {
            types[y as usize * w + x as usize] = t;
        }
        GameMap::from_types(w, h, types, vec![GridPos::new(1, 1)])
    }

    #[test]
    fn test_open_cross() {
        let map = arena(&[]);
        let blast = propagate(&map, GridPos::new(4, 4), 2);
        assert_eq!(
            blast.tiles,
            vec![
                GridPos::new(4, 4),
                GridPos::new(4, 3),
                GridPos::new(4, 2),
                GridPos::new(4, 5),
                GridPos::new(4, 6),
                GridPos::new(3, 4),
                GridPos::new(2, 4),
                GridPos::new(5, 4),
                GridPos::new(6, 4),
            ]
        );
        assert!(blast.destroyed_walls.is_empty());
    }

    #[test]
    fn test_solid_wall_stops_ray_and_is_excluded() {
        let map = arena(&[(4, 3, TileType::SolidWall)]);
        let blast = propagate(&map, GridPos::new(4, 4), 3);
        assert!(!blast.tiles.contains(&GridPos::new(4, 3)));
        assert!(!blast.tiles.contains(&GridPos::new(4, 2)));
        // other rays unaffected
        assert!(blast.tiles.contains(&GridPos::new(4, 7)));
        assert!(blast.tiles.contains(&GridPos::new(1, 4)));
    }

    #[test]
    fn test_destructible_wall_included_destroyed_and_stops() {
        let map = arena(&[(5, 4, TileType::DestructibleWall), (6, 4, TileType::DestructibleWall)]);
        let blast = propagate(&map, GridPos::new(4, 4), 3);
        assert!(blast.tiles.contains(&GridPos::new(5, 4)));
        assert!(!blast.tiles.contains(&GridPos::new(6, 4)));
        assert_eq!(blast.destroyed_walls, vec![GridPos::new(5, 4)]);
        assert_eq!(map.tile_type(GridPos::new(5, 4)), Some(TileType::Empty));
        assert_eq!(map.tile_type(GridPos::new(6, 4)), Some(TileType::DestructibleWall));
        // the west ray is independent of the east wall
        assert!(blast.tiles.contains(&GridPos::new(1, 4)));
    }

    #[test]
    fn test_border_clips_rays() {
        let map = arena(&[]);
        let blast = propagate(&map, GridPos::new(1, 1), 5);
        assert!(blast.tiles.iter().all(|p| map.in_bounds(*p)));
        assert!(!blast.tiles.contains(&GridPos::new(0, 1)));
        assert!(blast.tiles.contains(&GridPos::new(6, 1)));
        assert!(!blast.tiles.contains(&GridPos::new(7, 1)));
    }

    #[test]
    fn test_apply_damage() {
        let now = Instant::now();
        let settings = EngineSettings::default();
        let mut players = vec![
            Player::new(Uuid::new_v4(), "inside", GridPos::new(4, 4), &settings),
            Player::new(Uuid::new_v4(), "shielded", GridPos::new(4, 5), &settings),
            Player::new(Uuid::new_v4(), "outside", GridPos::new(7, 7), &settings),
        ];
        players[1].apply_effect(
            &PowerUpEffect {
                power_up_type: PowerUpType::TemporaryShield,
                value: 1,
                duration_ms: Some(10_000),
            },
            now,
        );

        let tiles = vec![GridPos::new(4, 4), GridPos::new(4, 5)];
        let hits = apply_damage(&mut players, &tiles, 1, now);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].outcome, HitOutcome::Died { eliminated: false });
        assert_eq!(hits[1].outcome, HitOutcome::ShieldConsumed);
        assert_eq!(players[0].deaths, 1);
        assert_eq!(players[1].deaths, 0);
        assert_eq!(players[2].deaths, 0);
    }

    #[test]
    fn test_explosion_expiry() {
        let now = Instant::now();
        let e = Explosion::new(Uuid::new_v4(), GridPos::new(1, 1), vec![GridPos::new(1, 1)], Duration::from_millis(500), 1, now);
        assert!(!e.is_expired(now + Duration::from_millis(499)));
        assert!(e.is_expired(now + Duration::from_millis(500)));
        assert!(e.affects(GridPos::new(1, 1)));
    }
}
