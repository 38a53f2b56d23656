//! Observability bus
//!
//! One-way fan-out of structured events to external observers. Subscribers
//! are best-effort: a slow subscriber falls behind its bounded queue and
//! loses the oldest events, counted but never blocking the trading loop.

use crate::exec::TradeRecord;
use crate::registry::{PairId, VenueId};
use crate::signal::EdgeQuote;
use crate::venue::Fill;
use serde::Serialize;
use tokio::sync::broadcast;

/// Event schema version, bumped on any field change
pub const SCHEMA_VERSION: u32 = 1;

/// Default bounded queue depth per subscriber
pub const DEFAULT_CAPACITY: usize = 1024;

/// Structured events published by the core
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    EdgeComputed(EdgeQuote),
    IntentAdmitted {
        pair_id: PairId,
        intent_id: uuid::Uuid,
        net_edge_cents: rust_decimal::Decimal,
    },
    IntentRejected {
        pair_id: PairId,
        reason: String,
    },
    LegFilled(Fill),
    TradeSettled(TradeRecord),
    TradeUnwound(TradeRecord),
    TradeFailed(TradeRecord),
    VenueDown(VenueId),
    VenueUp(VenueId),
    HaltRequested {
        venue: VenueId,
        who: String,
    },
    ResumeRequested {
        venue: VenueId,
        who: String,
    },
}

/// Non-blocking broadcast bus
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Never blocks; with no subscribers the event is
    /// simply dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Subscribe with a lag-counting tap
    pub fn subscribe(&self) -> EventTap {
        EventTap {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Subscriber handle that counts events lost to back-pressure
pub struct EventTap {
    rx: broadcast::Receiver<Event>,
    dropped: u64,
}

impl EventTap {
    /// Next event, skipping over any lag gap
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    tracing::warn!(dropped = n, "Slow subscriber lost events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event without waiting; `None` when the queue is drained
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(_) => return None,
            }
        }
    }

    /// Events lost to back-pressure so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
