//! Position tracking
//!
//! The execution engine is the only writer; risk reads through snapshots.
//! Fills are idempotent on their venue order id, so a replayed fill event
//! can never double-count.

use crate::registry::{Pair, VenueId};
use crate::venue::{Fill, TakerSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Running nets for one market
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub qty_yes: i64,
    pub qty_no: i64,
    pub avg_px_yes_cents: Decimal,
    pub avg_px_no_cents: Decimal,
}

impl Position {
    /// Net directional exposure in contracts (long YES positive)
    pub fn net_directional(&self) -> i64 {
        self.qty_yes - self.qty_no
    }

    /// Capital deployed in USD
    pub fn notional_usd(&self) -> Decimal {
        (Decimal::from(self.qty_yes) * self.avg_px_yes_cents
            + Decimal::from(self.qty_no) * self.avg_px_no_cents)
            / Decimal::from(100)
    }
}

/// Flattened row for periodic snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRow {
    pub ts: DateTime<Utc>,
    pub venue: VenueId,
    pub market_id: String,
    pub qty_yes: i64,
    pub qty_no: i64,
    pub avg_px_yes_cents: Decimal,
    pub avg_px_no_cents: Decimal,
}

/// All positions, owned exclusively by the execution engine
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<(VenueId, String), Position>,
    applied_orders: HashSet<Uuid>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fill; returns false if this order id was already applied
    pub fn apply(&mut self, fill: &Fill) -> bool {
        if !self.applied_orders.insert(fill.order_id) {
            tracing::warn!(order_id = %fill.order_id, "Duplicate fill ignored");
            return false;
        }

        let position = self
            .positions
            .entry((fill.venue, fill.market_id.clone()))
            .or_default();

        let qty = fill.qty as i64;
        match fill.side {
            TakerSide::BuyYes => {
                let total = position.qty_yes + qty;
                if total > 0 {
                    position.avg_px_yes_cents = (position.avg_px_yes_cents
                        * Decimal::from(position.qty_yes)
                        + fill.px_cents * Decimal::from(qty))
                        / Decimal::from(total);
                }
                position.qty_yes = total;
            }
            TakerSide::BuyNo => {
                let total = position.qty_no + qty;
                if total > 0 {
                    position.avg_px_no_cents = (position.avg_px_no_cents
                        * Decimal::from(position.qty_no)
                        + fill.px_cents * Decimal::from(qty))
                        / Decimal::from(total);
                }
                position.qty_no = total;
            }
        }
        true
    }

    /// Position for one market
    pub fn position(&self, venue: VenueId, market_id: &str) -> Position {
        self.positions
            .get(&(venue, market_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Capital deployed on a venue across all markets, in USD
    pub fn venue_notional_usd(&self, venue: VenueId) -> Decimal {
        self.positions
            .iter()
            .filter(|((v, _), _)| *v == venue)
            .map(|(_, p)| p.notional_usd())
            .sum()
    }

    /// Pair-level directional exposure in contracts.
    ///
    /// YES on one market of a pair hedges NO on the other, so the pair is
    /// flat when the two markets' directional nets cancel.
    pub fn pair_exposure(&self, pair: &Pair) -> i64 {
        let a = self
            .position(pair.market_a.venue, &pair.market_a.market_id)
            .net_directional();
        let b = self
            .position(pair.market_b.venue, &pair.market_b.market_id)
            .net_directional();
        a + b
    }

    /// Whether a pair's exposure is flat within one contract
    pub fn pair_flat(&self, pair: &Pair) -> bool {
        self.pair_exposure(pair).abs() <= 1
    }

    /// Snapshot rows for the periodic position journal
    pub fn rows(&self, ts: DateTime<Utc>) -> Vec<PositionRow> {
        self.positions
            .iter()
            .map(|((venue, market_id), p)| PositionRow {
                ts,
                venue: *venue,
                market_id: market_id.clone(),
                qty_yes: p.qty_yes,
                qty_no: p.qty_no,
                avg_px_yes_cents: p.avg_px_yes_cents,
                avg_px_no_cents: p.avg_px_no_cents,
            })
            .collect()
    }
}
