//! Change notifications for the presentation layer
//!
//! The engine mutates its state first and then publishes one event per
//! observable change. Subscribers that fall behind lose old events and are
//! expected to resynchronise from a snapshot.

use crate::domain::eq::EqualizerSettings;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const EVENT_CAPACITY: usize = 64;

/// Events published by the signal chain and the round engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PlaybackChanged {
        playing: bool,
    },
    VolumeChanged {
        volume: f32,
    },
    BypassChanged {
        bypassed: bool,
    },
    SourceChanged {
        name: String,
    },
    /// Emitted for every settings change, even when the new value is equal
    EqChanged {
        settings: EqualizerSettings,
    },
    RoundStarted,
    GuessResolved {
        correct: bool,
        score: u32,
        total_tries: u32,
    },
    TargetRevealed {
        settings: EqualizerSettings,
    },
    GameReset,
    Error {
        message: String,
    },
}

/// Broadcast channel wrapper shared by the chain and the session
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Send to all current subscribers; having none is fine
    pub fn publish(&self, event: SessionEvent) {
        trace!(?event, "Publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
