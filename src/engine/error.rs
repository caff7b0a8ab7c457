// Typed rejections returned by caller-initiated engine operations.

use thiserror::Error;

use super::geometry::GridPos;
use super::session::GameStatus;
use super::{BombId, PlayerId, PowerUpId, SessionId};

/// Coarse classification used by the transport layer to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input; rejected before touching state.
    Validation,
    /// The referenced session / player / bomb / power-up does not exist (any more).
    NotFound,
    /// The action is not valid for the current state.
    Conflict,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GameError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("player {player_id} not found in session {session_id}")]
    PlayerNotFound {
        session_id: SessionId,
        player_id: PlayerId,
    },

    #[error("bomb {0} not found")]
    BombNotFound(BombId),

    #[error("power-up {power_up_id} not found in session {session_id}")]
    PowerUpNotFound {
        session_id: SessionId,
        power_up_id: PowerUpId,
    },

    #[error("power-up {0} has expired")]
    PowerUpExpired(PowerUpId),

    #[error("invalid move for player {player_id} to {target}: {reason}")]
    InvalidMove {
        player_id: PlayerId,
        target: GridPos,
        reason: String,
    },

    #[error("cannot place bomb for player {player_id} at {position}: {reason}")]
    BombPlacement {
        player_id: PlayerId,
        position: GridPos,
        reason: String,
    },

    #[error("cannot {action} while session is {status}")]
    InvalidState {
        action: &'static str,
        status: GameStatus,
    },

    #[error("bomb {bomb_id} cannot explode: {reason}")]
    BombNotArmed { bomb_id: BombId, reason: String },

    #[error("player {player_id} is not standing on power-up {power_up_id}")]
    PowerUpOutOfReach {
        player_id: PlayerId,
        power_up_id: PowerUpId,
    },

    #[error("need at least {required} players to start, have {actual}")]
    NotEnoughPlayers { required: usize, actual: usize },

    #[error("session {0} is full")]
    SessionFull(SessionId),

    #[error("player {0} already joined")]
    DuplicatePlayer(PlayerId),

    #[error("session already exists for room {0}")]
    DuplicateSession(String),
}

impl GameError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        GameError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::Validation { .. } => ErrorKind::Validation,
            GameError::SessionNotFound(_)
            | GameError::PlayerNotFound { .. }
            | GameError::BombNotFound(_)
            | GameError::PowerUpNotFound { .. }
            | GameError::PowerUpExpired(_) => ErrorKind::NotFound,
            GameError::InvalidMove { .. }
            | GameError::BombPlacement { .. }
            | GameError::InvalidState { .. }
            | GameError::BombNotArmed { .. }
            | GameError::PowerUpOutOfReach { .. }
            | GameError::NotEnoughPlayers { .. }
            | GameError::SessionFull(_)
            | GameError::DuplicatePlayer(_)
            | GameError::DuplicateSession(_) => ErrorKind::Conflict,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation { .. } => "VALIDATION_ERROR",
            GameError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            GameError::PlayerNotFound { .. } => "PLAYER_NOT_FOUND",
            GameError::BombNotFound(_) => "BOMB_NOT_FOUND",
            GameError::PowerUpNotFound { .. } | GameError::PowerUpExpired(_) => {
                "POWERUP_NOT_FOUND"
            }
            GameError::InvalidMove { .. } | GameError::PowerUpOutOfReach { .. } => "INVALID_MOVE",
            GameError::BombPlacement { .. } => "BOMB_PLACEMENT_FAILED",
            GameError::InvalidState { .. }
            | GameError::BombNotArmed { .. }
            | GameError::NotEnoughPlayers { .. } => "INVALID_GAME_STATE",
            GameError::SessionFull(_) => "ROOM_FULL",
            GameError::DuplicatePlayer(_) => "PLAYER_EXISTS",
            GameError::DuplicateSession(_) => "SESSION_EXISTS",
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;

/// Parse a client-supplied identifier, rejecting blank or malformed values.
pub fn parse_id(field: &'static str, raw: &str) -> GameResult<uuid::Uuid> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GameError::validation(field, "cannot be blank"));
    }
    uuid::Uuid::parse_str(trimmed).map_err(|e| GameError::validation(field, e.to_string()))
}
