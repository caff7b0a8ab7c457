use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::MIN_MAP_SIZE;
use super::error::{GameError, GameResult};
use super::geometry::GridPos;
use super::map::{corner_spawn_points, GameMap};
use super::tile::TileType;

/// Procedural arena builder.
///
/// Layout:
/// 1. Solid border
/// 2. Corner spawn cells (marked SPAWN_POINT)
/// 3. Solid pillars on every even/even interior cell
/// 4. The 3x3 corner spawn zones kept clear
/// 5. Remaining cells become destructible rubble with probability `wall_density`
pub struct MapGenerator {
    rng: StdRng,
}

impl MapGenerator {
    /// Seeded generator. The same seed always yields the same layout.
    pub fn seeded(seed: u64) -> Self {
        MapGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        MapGenerator {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::seeded(s),
            None => Self::from_entropy(),
        }
    }

    pub fn generate(
        &mut self,
        width: usize,
        height: usize,
        wall_density: f64,
    ) -> GameResult<GameMap> {
        if width < MIN_MAP_SIZE || height < MIN_MAP_SIZE {
            return Err(GameError::validation(
                "dimensions",
                format!("map must be at least {MIN_MAP_SIZE}x{MIN_MAP_SIZE}"),
            ));
        }
        let wall_density = wall_density.clamp(0.0, 1.0);
        let spawn_points = corner_spawn_points(width, height);

        let mut types = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let pos = GridPos::new(x as i32, y as i32);
                let t = if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                    TileType::SolidWall
                } else if spawn_points.contains(&pos) {
                    TileType::SpawnPoint
                } else if x % 2 == 0 && y % 2 == 0 {
                    TileType::SolidWall
                } else if is_spawn_zone(x, y, width, height) {
                    TileType::Empty
                } else if self.rng.gen::<f64>() < wall_density {
                    TileType::DestructibleWall
                } else {
                    TileType::Empty
                };
                types.push(t);
            }
        }

        Ok(GameMap::from_types(width, height, types, spawn_points))
    }
}

fn is_spawn_zone(x: usize, y: usize, width: usize, height: usize) -> bool {
    let near_left = x <= 2;
    let near_right = x >= width - 3;
    let near_top = y <= 2;
    let near_bottom = y >= height - 3;
    (near_left || near_right) && (near_top || near_bottom)
}
