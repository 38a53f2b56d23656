//! Venue adapter surface
//!
//! A uniform bidirectional interface over a single venue: streaming
//! normalised book snapshots in, taker orders and cancels out. The core
//! depends only on this capability; per-venue wire encodings live behind it.

mod sim;
mod types;
mod ws;

pub use sim::{taker_intent, SimBehavior, SimVenue};
pub use types::{
    CancelOutcome, Fill, HealthEvent, OrderAck, OrderIntent, Rejection, TakerSide, VenueError,
};
pub use ws::{StreamEvent, VenueStream, WsConfig};

use crate::book::BookSnapshot;
use crate::registry::VenueId;
use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capability set every venue adapter provides
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Which venue this adapter fronts
    fn venue(&self) -> VenueId;

    /// Begin streaming snapshots for the given markets
    async fn subscribe(&self, market_ids: &[String]) -> Result<(), VenueError>;

    /// Stop streaming snapshots for the given markets
    async fn unsubscribe(&self, market_ids: &[String]) -> Result<(), VenueError>;

    /// Place a taker order. Rejections are reported synchronously and are
    /// never retried here.
    async fn place_taker(&self, intent: OrderIntent) -> Result<OrderAck, Rejection>;

    /// Cancel an open order
    async fn cancel(&self, venue_order_id: Uuid) -> Result<CancelOutcome, VenueError>;

    /// Stream of normalised book snapshots
    fn snapshots(&self) -> broadcast::Receiver<BookSnapshot>;

    /// Stream of fills for this venue's orders
    fn fills(&self) -> broadcast::Receiver<Fill>;

    /// Stream of connectivity transitions
    fn health_events(&self) -> broadcast::Receiver<HealthEvent>;
}
