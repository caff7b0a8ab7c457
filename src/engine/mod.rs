pub mod bomb;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod explosion;
pub mod geometry;
pub mod map;
pub mod mapgen;
pub mod occupancy;
pub mod player;
pub mod powerup;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod tile;

pub type SessionId = uuid::Uuid;
pub type PlayerId = uuid::Uuid;
pub type BombId = uuid::Uuid;
pub type PowerUpId = uuid::Uuid;
