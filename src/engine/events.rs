// Domain notifications and the sinks they are published to.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use super::geometry::GridPos;
use super::powerup::PowerUpEffect;
use super::session::GameStatus;
use super::{BombId, PlayerId, PowerUpId, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    SessionStateChanged {
        previous: GameStatus,
        status: GameStatus,
    },
    PlayerKilled {
        /// `None` for self-inflicted deaths.
        killer_id: Option<PlayerId>,
        victim_id: PlayerId,
    },
    BombExploded {
        bomb_id: BombId,
        affected_tiles: Vec<GridPos>,
        affected_players: Vec<PlayerId>,
    },
    PowerUpCollected {
        player_id: PlayerId,
        power_up_id: PowerUpId,
        effect: PowerUpEffect,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::SessionStateChanged { .. } => "session_state_changed",
            GameEvent::PlayerKilled { .. } => "player_killed",
            GameEvent::BombExploded { .. } => "bomb_exploded",
            GameEvent::PowerUpCollected { .. } => "power_up_collected",
        }
    }
}

/// An event tagged with its session, as handed to transports.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    /// Epoch millis.
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: GameEvent,
}

/// Receives every notification the engine emits. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, session_id: SessionId, event: GameEvent);
}

/// Fans events out over a tokio broadcast channel.
pub struct BroadcastSink {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, session_id: SessionId, event: GameEvent) {
        let msg = SessionEvent {
            session_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            event,
        };
        // no subscribers is fine
        let _ = self.tx.send(msg);
    }
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _session_id: SessionId, _event: GameEvent) {}
}

/// Keeps every event in memory, in publish order.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<(SessionId, GameEvent)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(SessionId, GameEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<GameEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
            .into_iter()
            .map(|(_, e)| e)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, session_id: SessionId, event: GameEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session_id, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_event_json_is_tagged() {
        let victim = Uuid::new_v4();
        let e = GameEvent::PlayerKilled {
            killer_id: None,
            victim_id: victim,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "player_killed");
        assert!(json["killer_id"].is_null());
        assert_eq!(json["victim_id"], victim.to_string());
        assert_eq!(e.name(), "player_killed");
    }

    #[test]
    fn test_session_event_flattens() {
        let msg = SessionEvent {
            session_id: Uuid::new_v4(),
            timestamp: 1,
            event: GameEvent::SessionStateChanged {
                previous: GameStatus::Waiting,
                status: GameStatus::InProgress,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "session_state_changed");
        assert_eq!(json["status"], "IN_PROGRESS");
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();
        let sid = Uuid::new_v4();
        sink.publish(
            sid,
            GameEvent::BombExploded {
                bomb_id: Uuid::new_v4(),
                affected_tiles: vec![GridPos::new(1, 1)],
                affected_players: vec![],
            },
        );
        let got = rx.recv().await.unwrap();
        assert_eq!(got.session_id, sid);
        assert_eq!(got.event.name(), "bomb_exploded");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(4);
        sink.publish(
            Uuid::new_v4(),
            GameEvent::SessionStateChanged {
                previous: GameStatus::InProgress,
                status: GameStatus::Finished,
            },
        );
    }

    #[test]
    fn test_memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.publish(Uuid::new_v4(), GameEvent::SessionStateChanged {
            previous: GameStatus::Waiting,
            status: GameStatus::Starting,
        });
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.take().is_empty());
    }
}
