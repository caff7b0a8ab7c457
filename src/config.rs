// Process configuration, loaded from environment variables and CLI flags.

use std::str::FromStr;

use crate::engine::config::{
    EngineSettings, DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH, DEFAULT_MAX_PLAYERS,
    DEFAULT_TICK_INTERVAL_MS, DEFAULT_TIMER_WORKERS,
};

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Interval between driver ticks.
    pub tick_interval_ms: u64,
    /// Worker tasks in the bomb/power-up timer pool.
    pub timer_workers: usize,
    /// Seed for map generation and power-up drops.
    pub seed: Option<u64>,
    pub map_width: usize,
    pub map_height: usize,
    pub max_players: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            timer_workers: DEFAULT_TIMER_WORKERS,
            seed: None,
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `TICK_INTERVAL_MS` - driver tick interval (default: 16)
    /// - `TIMER_WORKERS` - timer pool size (default: 10)
    /// - `BOMBER_SEED` - RNG seed for reproducible maps and drops
    /// - `MAP_WIDTH`, `MAP_HEIGHT` - arena size (default: 13x13)
    /// - `MAX_PLAYERS` - players per session (default: 4)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--seed <SEED>` - Override the seed
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// CLI flag takes precedence, then env var, then default. Unparseable
    /// values fall back to the default.
    pub fn from_sources<F>(args: &[String], env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let pick = |flag: Option<&str>, key: &str| -> Option<String> {
            flag.and_then(|f| Self::parse_cli_value(args, f))
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env(key))
        };

        Config {
            port: parsed(pick(Some("--port"), "PORT")).unwrap_or(defaults.port),
            tick_interval_ms: parsed(pick(None, "TICK_INTERVAL_MS"))
                .filter(|&ms| ms > 0)
                .unwrap_or(defaults.tick_interval_ms),
            timer_workers: parsed(pick(None, "TIMER_WORKERS"))
                .filter(|&n| n > 0)
                .unwrap_or(defaults.timer_workers),
            seed: parsed(pick(Some("--seed"), "BOMBER_SEED")),
            map_width: parsed(pick(None, "MAP_WIDTH")).unwrap_or(defaults.map_width),
            map_height: parsed(pick(None, "MAP_HEIGHT")).unwrap_or(defaults.map_height),
            max_players: parsed(pick(None, "MAX_PLAYERS")).unwrap_or(defaults.max_players),
        }
    }

    /// Engine tunables derived from this config, clamped to legal ranges.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            map_width: self.map_width,
            map_height: self.map_height,
            max_players: self.max_players,
            seed: self.seed,
            ..EngineSettings::default()
        }
        .sanitized()
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn parsed<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}
