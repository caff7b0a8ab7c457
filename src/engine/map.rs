use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::geometry::GridPos;
use super::tile::{Tile, TileType};

/// Fixed-size tile grid plus the corner spawn points.
///
/// Every cell sits behind its own mutex so occupancy and bomb flags can be
/// flipped without a grid-wide lock. Callers that also hold a session lock must
/// take that first; a tile guard is never held while acquiring anything else.
pub struct GameMap {
    pub width: usize,
    pub height: usize,
    cells: Vec<Mutex<Tile>>,
    spawn_points: Vec<GridPos>,
}

/// Plain copy of the grid for snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct TileView {
    #[serde(rename = "type")]
    pub tile_type: TileType,
    pub occupied: bool,
    pub has_bomb: bool,
}

impl GameMap {
    /// Build a map from row-major tile types. `types.len()` must equal `width * height`.
    pub fn from_types(
        width: usize,
        height: usize,
        types: Vec<TileType>,
        spawn_points: Vec<GridPos>,
    ) -> Self {
        assert_eq!(types.len(), width * height, "tile count does not match dimensions");
        GameMap {
            width,
            height,
            cells: types.into_iter().map(|t| Mutex::new(Tile::new(t))).collect(),
            spawn_points,
        }
    }

    /// All-floor map surrounded by solid walls. Useful for hand-built layouts.
    pub fn open(width: usize, height: usize) -> Self {
        let mut types = vec![TileType::Empty; width * height];
        for y in 0..height {
            for x in 0..width {
                if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                    types[y * width + x] = TileType::SolidWall;
                }
            }
        }
        let spawn_points = corner_spawn_points(width, height);
        for p in &spawn_points {
            types[p.y as usize * width + p.x as usize] = TileType::SpawnPoint;
        }
        GameMap::from_types(width, height, types, spawn_points)
    }

    #[inline]
    fn index(&self, pos: GridPos) -> Option<usize> {
        if self.in_bounds(pos) {
            Some(pos.y as usize * self.width + pos.x as usize)
        } else {
            None
        }
    }

    fn cell(&self, pos: GridPos) -> Option<MutexGuard<'_, Tile>> {
        self.index(pos)
            .map(|i| self.cells[i].lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// Copy of the tile at `pos`, or `None` when out of bounds.
    pub fn tile(&self, pos: GridPos) -> Option<Tile> {
        self.cell(pos).map(|t| *t)
    }

    pub fn tile_type(&self, pos: GridPos) -> Option<TileType> {
        self.cell(pos).map(|t| t.tile_type)
    }

    pub fn spawn_points(&self) -> &[GridPos] {
        &self.spawn_points
    }

    /// Spawn points whose tile is not currently claimed.
    pub fn available_spawn_points(&self) -> Vec<GridPos> {
        self.spawn_points
            .iter()
            .copied()
            .filter(|p| self.tile(*p).is_some_and(|t| !t.occupied))
            .collect()
    }

    /// Floor cells where a power-up could appear.
    pub fn empty_positions(&self) -> Vec<GridPos> {
        let mut out = Vec::new();
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let p = GridPos::new(x, y);
                if self
                    .tile(p)
                    .is_some_and(|t| t.tile_type.can_spawn_power_up() && !t.occupied && !t.has_bomb)
                {
                    out.push(p);
                }
            }
        }
        out
    }

    // --- Occupancy ---

    /// Claim `pos` if it is floor, unclaimed, and bomb-free (unless `allow_if_bomb`).
    /// Check and claim happen under the same cell lock.
    pub fn try_occupy(&self, pos: GridPos, allow_if_bomb: bool) -> bool {
        match self.cell(pos) {
            Some(mut tile) if tile.can_occupy(allow_if_bomb) => {
                tile.occupied = true;
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, pos: GridPos) {
        if let Some(mut tile) = self.cell(pos) {
            tile.occupied = false;
        }
    }

    /// Set or clear the bomb flag. Occupancy is left untouched.
    pub fn mark_bomb(&self, pos: GridPos, present: bool) {
        if let Some(mut tile) = self.cell(pos) {
            tile.has_bomb = present;
        }
    }

    /// Set the bomb flag only if it was clear. Returns false when a bomb is already there.
    pub fn try_mark_bomb(&self, pos: GridPos) -> bool {
        match self.cell(pos) {
            Some(mut tile) if !tile.has_bomb && tile.tile_type.is_walkable() => {
                tile.has_bomb = true;
                true
            }
            _ => false,
        }
    }

    /// Destroy a destructible wall at `pos`. Returns true if a wall was removed.
    pub fn destroy_wall(&self, pos: GridPos) -> bool {
        self.cell(pos).is_some_and(|mut t| t.destroy())
    }

    /// Row-major view of the whole grid.
    pub fn rows(&self) -> Vec<Vec<TileView>> {
        (0..self.height as i32)
            .map(|y| {
                (0..self.width as i32)
                    .filter_map(|x| self.tile(GridPos::new(x, y)))
                    .map(|t| TileView {
                        tile_type: t.tile_type,
                        occupied: t.occupied,
                        has_bomb: t.has_bomb,
                    })
                    .collect()
            })
            .collect()
    }
}

/// Classic four-corner layout, one cell in from the border.
pub fn corner_spawn_points(width: usize, height: usize) -> Vec<GridPos> {
    let (w, h) = (width as i32, height as i32);
    vec![
        GridPos::new(1, 1),
        GridPos::new(w - 2, 1),
        GridPos::new(1, h - 2),
        GridPos::new(w - 2, h - 2),
    ]
}
