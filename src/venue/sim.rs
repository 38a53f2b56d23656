//! In-process simulated venue
//!
//! Drives paper trading and the integration tests: books are pushed by the
//! caller, taker orders ack and fill after configurable delays, and every
//! failure mode the live adapters can produce (rejects, partial fills,
//! unavailability, delayed hedges) can be scripted.

use super::types::{
    CancelOutcome, Fill, HealthEvent, OrderAck, OrderIntent, Rejection, TakerSide, VenueError,
};
use super::VenueAdapter;
use crate::book::{BookSnapshot, Level};
use crate::registry::VenueId;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scriptable behaviour knobs
#[derive(Debug, Clone)]
pub struct SimBehavior {
    /// Delay before `place_taker` returns its ack
    pub ack_delay: Duration,
    /// Delay between ack and the fill event
    pub fill_delay: Duration,
    /// Reject every order with this reason
    pub reject_with: Option<Rejection>,
    /// Cap fills at this quantity (partial fill simulation)
    pub fill_cap: Option<u64>,
    /// Suppress fills entirely (orders rest until cancelled)
    pub swallow_fills: bool,
    /// Taker fee charged per contract, in cents
    pub fee_per_contract_cents: Decimal,
    /// Refuse everything, as a disconnected adapter would
    pub down: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            ack_delay: Duration::from_millis(0),
            fill_delay: Duration::from_millis(0),
            reject_with: None,
            fill_cap: None,
            swallow_fills: false,
            fee_per_contract_cents: Decimal::ZERO,
            down: false,
        }
    }
}

/// Simulated venue adapter
pub struct SimVenue {
    venue: VenueId,
    seq: AtomicU64,
    books: RwLock<HashMap<String, BookSnapshot>>,
    behavior: RwLock<SimBehavior>,
    open_orders: Arc<Mutex<HashMap<Uuid, OrderIntent>>>,
    snap_tx: broadcast::Sender<BookSnapshot>,
    fill_tx: broadcast::Sender<Fill>,
    health_tx: broadcast::Sender<HealthEvent>,
}

impl SimVenue {
    pub fn new(venue: VenueId) -> Arc<Self> {
        let (snap_tx, _) = broadcast::channel(1024);
        let (fill_tx, _) = broadcast::channel(1024);
        let (health_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            venue,
            seq: AtomicU64::new(0),
            books: RwLock::new(HashMap::new()),
            behavior: RwLock::new(SimBehavior::default()),
            open_orders: Arc::new(Mutex::new(HashMap::new())),
            snap_tx,
            fill_tx,
            health_tx,
        })
    }

    /// Publish a new book for a market and broadcast the snapshot
    pub fn push_book(&self, market_id: &str, bids: Vec<Level>, asks: Vec<Level>) -> BookSnapshot {
        let now = Utc::now();
        let snap = BookSnapshot {
            venue: self.venue,
            market_id: market_id.to_string(),
            received_at: now,
            venue_ts: now,
            bids,
            asks,
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.books
            .write()
            .expect("sim books poisoned")
            .insert(market_id.to_string(), snap.clone());
        let _ = self.snap_tx.send(snap.clone());
        snap
    }

    /// Replace the behaviour script
    pub fn set_behavior(&self, behavior: SimBehavior) {
        *self.behavior.write().expect("sim behavior poisoned") = behavior;
    }

    /// Mutate the behaviour script in place
    pub fn update_behavior(&self, f: impl FnOnce(&mut SimBehavior)) {
        let mut guard = self.behavior.write().expect("sim behavior poisoned");
        f(&mut guard);
    }

    /// Flip availability and emit the matching health event
    pub fn set_down(&self, down: bool) {
        self.update_behavior(|b| b.down = down);
        let event = if down {
            HealthEvent::Down(self.venue)
        } else {
            HealthEvent::Up(self.venue)
        };
        let _ = self.health_tx.send(event);
    }

    /// Count of orders resting unfilled
    pub fn open_order_count(&self) -> usize {
        self.open_orders.lock().expect("sim orders poisoned").len()
    }

    fn behavior(&self) -> SimBehavior {
        self.behavior.read().expect("sim behavior poisoned").clone()
    }
}

#[async_trait]
impl VenueAdapter for SimVenue {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn subscribe(&self, market_ids: &[String]) -> Result<(), VenueError> {
        tracing::debug!(venue = %self.venue, count = market_ids.len(), "Sim subscribe");
        Ok(())
    }

    async fn unsubscribe(&self, market_ids: &[String]) -> Result<(), VenueError> {
        tracing::debug!(venue = %self.venue, count = market_ids.len(), "Sim unsubscribe");
        Ok(())
    }

    async fn place_taker(&self, intent: OrderIntent) -> Result<OrderAck, Rejection> {
        let behavior = self.behavior();
        if behavior.down {
            return Err(Rejection::Unavailable);
        }
        if let Some(reason) = behavior.reject_with {
            return Err(reason);
        }
        if intent.qty == 0 {
            return Err(Rejection::InvalidSize);
        }

        if !behavior.ack_delay.is_zero() {
            tokio::time::sleep(behavior.ack_delay).await;
        }

        let venue_order_id = Uuid::new_v4();
        let ack = OrderAck {
            intent_id: intent.intent_id,
            venue_order_id,
            accepted_at: Utc::now(),
        };

        self.open_orders
            .lock()
            .expect("sim orders poisoned")
            .insert(venue_order_id, intent.clone());

        if !behavior.swallow_fills {
            let open_orders = Arc::clone(&self.open_orders);
            let fill_tx = self.fill_tx.clone();
            let fill_delay = behavior.fill_delay;
            let fill_cap = behavior.fill_cap;
            let fee = behavior.fee_per_contract_cents;
            tokio::spawn(async move {
                if !fill_delay.is_zero() {
                    tokio::time::sleep(fill_delay).await;
                }
                // Cancelled orders have been removed by now.
                let Some(order) = open_orders
                    .lock()
                    .expect("sim orders poisoned")
                    .remove(&venue_order_id)
                else {
                    return;
                };
                let qty = fill_cap.map_or(order.qty, |cap| cap.min(order.qty));
                if qty == 0 {
                    return;
                }
                let fill = Fill {
                    order_id: venue_order_id,
                    venue: order.venue,
                    market_id: order.market_id,
                    side: order.side,
                    px_cents: order.limit_px_cents,
                    qty,
                    ts: Utc::now(),
                    fee_paid_cents: fee * Decimal::from(qty),
                };
                let _ = fill_tx.send(fill);
            });
        }

        Ok(ack)
    }

    async fn cancel(&self, venue_order_id: Uuid) -> Result<CancelOutcome, VenueError> {
        let removed = self
            .open_orders
            .lock()
            .expect("sim orders poisoned")
            .remove(&venue_order_id)
            .is_some();
        Ok(if removed {
            CancelOutcome::Cancelled
        } else {
            CancelOutcome::TooLate
        })
    }

    fn snapshots(&self) -> broadcast::Receiver<BookSnapshot> {
        self.snap_tx.subscribe()
    }

    fn fills(&self) -> broadcast::Receiver<Fill> {
        self.fill_tx.subscribe()
    }

    fn health_events(&self) -> broadcast::Receiver<HealthEvent> {
        self.health_tx.subscribe()
    }
}

/// Build a taker intent against a sim venue (test/paper helper)
pub fn taker_intent(
    venue: VenueId,
    market_id: &str,
    side: TakerSide,
    limit_px_cents: Decimal,
    qty: u64,
    deadline_ms: i64,
) -> OrderIntent {
    let now = Utc::now();
    OrderIntent {
        intent_id: Uuid::new_v4(),
        venue,
        market_id: market_id.to_string(),
        side,
        limit_px_cents,
        qty,
        created_at: now,
        deadline: now + chrono::Duration::milliseconds(deadline_ms),
    }
}
