//! Event types and broadcast bus for Ledger Chimes
//!
//! Provides the shared event enum and EventBus used to connect the stream
//! client and sonification engine to external observers (visualization,
//! logging). Events carry everything an observer needs; nothing feeds back
//! into scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::record::{ConnectionState, TransactionRecord};

/// Ledger Chimes event types
///
/// Events are broadcast via [`EventBus`] and can be serialized for external
/// transmission. All observers consume this central enum for type safety and
/// exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChimesEvent {
    /// A validated, deduplicated transaction entered the system
    ///
    /// Triggers:
    /// - Sonification: schedule voices for the record
    /// - Visualization: display the transaction
    TransactionAccepted {
        /// The canonical record delivered to listeners
        record: TransactionRecord,
        /// When the record was accepted
        timestamp: DateTime<Utc>,
    },

    /// The engine scheduled the primary voice for a transaction
    ///
    /// Triggers:
    /// - Visualization: display the played note
    ///
    /// NOTE: Emitted after scheduling; observers never influence scheduling.
    NotePlayed {
        /// Transaction hash the note was derived from
        id: String,
        /// Primary voice frequency in Hz
        frequency: f32,
        /// Wall-clock emission time
        timestamp: DateTime<Utc>,
    },

    /// Stream client moved to a new connection state
    ConnectionStateChanged {
        /// State before the transition
        old_state: ConnectionState,
        /// State after the transition
        new_state: ConnectionState,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },

    /// Reconnection budget exhausted; the client stopped retrying
    ///
    /// Fatal for the session: the owner decides whether to call `connect()`
    /// again (which resets the attempt counter).
    ClientTerminated {
        /// Human-readable failure summary
        reason: String,
        /// When the client gave up
        timestamp: DateTime<Utc>,
    },

    /// No audio backend could be opened; engine is running silently
    ///
    /// Emitted at most once per engine session.
    AudioUnavailable {
        /// Why the backend could not be opened
        reason: String,
        /// When silent mode was entered
        timestamp: DateTime<Utc>,
    },
}

/// Central event distribution bus for application-wide events
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChimesEvent>,
}

impl EventBus {
    /// Create a new EventBus with the specified channel capacity
    ///
    /// # Arguments
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ChimesEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    pub fn emit(
        &self,
        event: ChimesEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<ChimesEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: ChimesEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(ChimesEvent::NotePlayed {
            id: "DEADBEEF".to_string(),
            frequency: 440.0,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            ChimesEvent::NotePlayed { id, frequency, .. } => {
                assert_eq!(id, "DEADBEEF");
                assert_eq!(frequency, 440.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);

        // emit() reports the absence of subscribers, emit_lossy() ignores it
        assert!(bus.emit(ChimesEvent::ClientTerminated {
            reason: "test".to_string(),
            timestamp: Utc::now(),
        })
        .is_err());

        bus.emit_lossy(ChimesEvent::ClientTerminated {
            reason: "test".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit_lossy(ChimesEvent::AudioUnavailable {
            reason: "no device".to_string(),
            timestamp: Utc::now(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            ChimesEvent::AudioUnavailable { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ChimesEvent::AudioUnavailable { .. }
        ));
    }

    #[test]
    fn test_event_serialization() {
        let event = ChimesEvent::NotePlayed {
            id: "CAFE".to_string(),
            frequency: 261.63,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"NotePlayed\""));
    }
}
