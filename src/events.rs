//! Structured engine events for external consumers.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::venue::VenueId;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something observable happened inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The scanner produced a candidate.
    OpportunityFound {
        /// Pair key.
        pair: String,
        /// Cheapest venue.
        buy_venue: VenueId,
        /// Most expensive venue.
        sell_venue: VenueId,
        /// Spread in percent.
        profit_pct: Decimal,
    },
    /// A pipeline run settled.
    ExecutionSucceeded {
        /// Pair key.
        pair: String,
        /// Backend confirmation id.
        confirmation_id: String,
        /// Profit reported by the backend.
        realized_profit: Decimal,
        /// Run duration.
        elapsed_ms: u64,
    },
    /// A pipeline run failed.
    ExecutionFailed {
        /// Pair key.
        pair: String,
        /// Failure reason.
        reason: String,
        /// Run duration.
        elapsed_ms: u64,
    },
    /// A venue was suspended.
    CircuitOpened {
        /// Suspended venue.
        venue: VenueId,
        /// Failures that tripped the circuit.
        consecutive_failures: u32,
        /// Suspension length.
        cooldown_seconds: u64,
    },
    /// A venue resumed polling.
    CircuitClosed {
        /// Resumed venue.
        venue: VenueId,
    },
}

impl EngineEvent {
    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::OpportunityFound { .. } => "opportunity_found",
            EngineEvent::ExecutionSucceeded { .. } => "execution_succeeded",
            EngineEvent::ExecutionFailed { .. } => "execution_failed",
            EngineEvent::CircuitOpened { .. } => "circuit_opened",
            EngineEvent::CircuitClosed { .. } => "circuit_closed",
        }
    }
}

/// Broadcast channel of engine events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(kind = event.kind(), "Event dropped, no subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        let sent = bus.publish(EngineEvent::CircuitClosed {
            venue: VenueId::new("v1"),
        });
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::CircuitOpened {
            venue: VenueId::new("v1"),
            consecutive_failures: 5,
            cooldown_seconds: 30,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "circuit_opened");
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(EngineEvent::CircuitClosed {
            venue: VenueId::new("meteora"),
        })
        .unwrap();
        assert_eq!(json["type"], "circuit_closed");
        assert_eq!(json["venue"], "meteora");
    }
}
