//! Normalised order book snapshots
//!
//! Adapters normalise venue messages into `BookSnapshot`s over the YES side
//! of each binary market: bids and asks best-first, prices in cents.

mod bars;
mod cache;

pub use bars::{Bar, BarSeries};
pub use cache::{Applied, BookCache};

use crate::registry::VenueId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Price in cents, in [0, 100]
    pub price_cents: Decimal,
    /// Available size in contracts
    pub size: u64,
}

impl Level {
    pub fn new(price_cents: Decimal, size: u64) -> Self {
        Self { price_cents, size }
    }
}

/// Most-recent normalised book for one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub venue: VenueId,
    pub market_id: String,
    /// Local arrival time
    pub received_at: DateTime<Utc>,
    /// Venue-reported timestamp
    pub venue_ts: DateTime<Utc>,
    /// Bid levels, best (highest) first
    pub bids: Vec<Level>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<Level>,
    /// Venue sequence number, monotonic per market
    pub seq: u64,
}

impl BookSnapshot {
    /// Best bid level
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    /// Best ask level
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    /// Mid price in cents
    pub fn mid_cents(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price_cents + ask.price_cents) / Decimal::TWO),
            _ => None,
        }
    }

    /// Whether the book is crossed (best bid at or above best ask)
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price_cents >= ask.price_cents,
            _ => false,
        }
    }

    /// Snapshot age relative to `now`, in milliseconds
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_at).num_milliseconds()
    }
}
