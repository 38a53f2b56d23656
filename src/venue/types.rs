//! Venue order and health types

use crate::registry::VenueId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Taker order side on a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakerSide {
    BuyYes,
    BuyNo,
}

impl TakerSide {
    /// The offsetting side on the same market
    pub fn offsetting(self) -> Self {
        match self {
            TakerSide::BuyYes => TakerSide::BuyNo,
            TakerSide::BuyNo => TakerSide::BuyYes,
        }
    }
}

impl std::fmt::Display for TakerSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TakerSide::BuyYes => write!(f, "buy_yes"),
            TakerSide::BuyNo => write!(f, "buy_no"),
        }
    }
}

/// A taker order to be placed on a venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub intent_id: Uuid,
    pub venue: VenueId,
    pub market_id: String,
    pub side: TakerSide,
    /// Worst acceptable price in cents for the bought token
    pub limit_px_cents: Decimal,
    pub qty: u64,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Acknowledgement that a venue accepted an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderAck {
    pub intent_id: Uuid,
    pub venue_order_id: Uuid,
    pub accepted_at: DateTime<Utc>,
}

/// Synchronous refusal of an order; never retried by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("venue unavailable")]
    Unavailable,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("price outside band")]
    PriceOutsideBand,
    #[error("market halted")]
    MarketHalted,
    #[error("unknown market")]
    UnknownMarket,
    #[error("invalid size")]
    InvalidSize,
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    Cancelled,
    /// Order already filled or expired
    TooLate,
}

/// An executed trade reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// Venue order id this fill belongs to
    pub order_id: Uuid,
    pub venue: VenueId,
    pub market_id: String,
    pub side: TakerSide,
    pub px_cents: Decimal,
    pub qty: u64,
    pub ts: DateTime<Utc>,
    pub fee_paid_cents: Decimal,
}

/// Venue connectivity transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthEvent {
    Down(VenueId),
    Up(VenueId),
}

/// Adapter-level failures
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not connected")]
    NotConnected,
    #[error("adapter closed")]
    Closed,
}
