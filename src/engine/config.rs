// Map defaults
pub const DEFAULT_MAP_WIDTH: usize = 13;
pub const DEFAULT_MAP_HEIGHT: usize = 13;
pub const MIN_MAP_SIZE: usize = 12;
pub const DESTRUCTIBLE_WALL_DENSITY: f64 = 0.4;

// Session defaults
pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS_LIMIT: usize = 8;
pub const DEFAULT_ROUND_DURATION_SECS: u64 = 180;
pub const MIN_ROUND_DURATION_SECS: u64 = 60;

// Player defaults
pub const DEFAULT_PLAYER_LIVES: u32 = 3;
pub const DEFAULT_BOMB_COUNT: u32 = 1;
pub const DEFAULT_BOMB_RANGE: u32 = 2;
pub const DEFAULT_PLAYER_SPEED: u32 = 1;
pub const DEFAULT_RESPAWN_DELAY_MS: u64 = 2000;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

// Bomb / explosion
pub const DEFAULT_FUSE_MS: u64 = 3000;
pub const MIN_FUSE_MS: u64 = 1000;
pub const DEFAULT_EXPLOSION_DURATION_MS: u64 = 500;
pub const DEFAULT_EXPLOSION_DAMAGE: u32 = 1;

// Power-ups
pub const DEFAULT_POWERUP_DURATION_MS: u64 = 30_000;
pub const DEFAULT_POWERUP_VALUE: u32 = 1;
pub const POWERUP_DROP_RATE: f64 = 0.3;
pub const DEFAULT_SHIELD_DURATION_MS: u64 = 10_000;

// Driver
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;
pub const DEFAULT_TIMER_WORKERS: usize = 10;

/// Tunables for one engine instance. Every session created by a
/// [`GameServer`](super::server::GameServer) inherits these values.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub map_width: usize,
    pub map_height: usize,
    pub wall_density: f64,
    pub max_players: usize,
    pub round_duration_secs: u64,
    pub player_lives: u32,
    pub bomb_count: u32,
    pub bomb_range: u32,
    pub player_speed: u32,
    pub respawn_delay_ms: u64,
    pub fuse_ms: u64,
    pub explosion_duration_ms: u64,
    pub explosion_damage: u32,
    pub power_up_duration_ms: u64,
    pub power_up_value: u32,
    pub shield_duration_ms: u64,
    pub drop_rate: f64,
    /// Seed for map generation and power-up drops. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            wall_density: DESTRUCTIBLE_WALL_DENSITY,
            max_players: DEFAULT_MAX_PLAYERS,
            round_duration_secs: DEFAULT_ROUND_DURATION_SECS,
            player_lives: DEFAULT_PLAYER_LIVES,
            bomb_count: DEFAULT_BOMB_COUNT,
            bomb_range: DEFAULT_BOMB_RANGE,
            player_speed: DEFAULT_PLAYER_SPEED,
            respawn_delay_ms: DEFAULT_RESPAWN_DELAY_MS,
            fuse_ms: DEFAULT_FUSE_MS,
            explosion_duration_ms: DEFAULT_EXPLOSION_DURATION_MS,
            explosion_damage: DEFAULT_EXPLOSION_DAMAGE,
            power_up_duration_ms: DEFAULT_POWERUP_DURATION_MS,
            power_up_value: DEFAULT_POWERUP_VALUE,
            shield_duration_ms: DEFAULT_SHIELD_DURATION_MS,
            drop_rate: POWERUP_DROP_RATE,
            seed: None,
        }
    }
}

impl EngineSettings {
    /// Clamp values that would otherwise break engine invariants
    /// (fuse below one second, maps too small for the corner spawn zones, ...).
    pub fn sanitized(mut self) -> Self {
        self.map_width = self.map_width.max(MIN_MAP_SIZE);
        self.map_height = self.map_height.max(MIN_MAP_SIZE);
        self.wall_density = self.wall_density.clamp(0.0, 1.0);
        self.max_players = self.max_players.clamp(MIN_PLAYERS, MAX_PLAYERS_LIMIT);
        self.round_duration_secs = self.round_duration_secs.max(MIN_ROUND_DURATION_SECS);
        self.player_lives = self.player_lives.max(1);
        self.bomb_count = self.bomb_count.max(1);
        self.bomb_range = self.bomb_range.max(1);
        self.player_speed = self.player_speed.max(1);
        self.fuse_ms = self.fuse_ms.max(MIN_FUSE_MS);
        self.explosion_duration_ms = self.explosion_duration_ms.max(100);
        self.explosion_damage = self.explosion_damage.max(1);
        self.power_up_value = self.power_up_value.max(1);
        self.drop_rate = self.drop_rate.clamp(0.0, 1.0);
        self
    }
}
