//! Signal engine
//!
//! Recomputes a pair's edge quote whenever either of its books updates. The
//! computation is pure and non-suspending: it reads cached snapshots, the
//! current fee packs, and the latest lead-lag hint, and never holds an edge
//! built from a snapshot older than the freshness budget.

mod edge;
mod leadlag;

pub use edge::{compute_edge, EdgeQuote, EdgeSkip, LegPlan, Package};
pub use leadlag::{
    cross_correlation, spawn_leadlag_worker, LeadLagAnalyzer, LeaderBoard, LeaderHint,
};

use crate::book::BookCache;
use crate::registry::{Pair, Registry};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Signal engine over the shared live state
pub struct SignalEngine {
    registry: Arc<Registry>,
    books: Arc<BookCache>,
    board: Arc<LeaderBoard>,
    intended_qty: u64,
    freshness_budget_ms: u64,
}

impl SignalEngine {
    pub fn new(
        registry: Arc<Registry>,
        books: Arc<BookCache>,
        board: Arc<LeaderBoard>,
        intended_qty: u64,
        freshness_budget_ms: u64,
    ) -> Self {
        Self {
            registry,
            books,
            board,
            intended_qty,
            freshness_budget_ms,
        }
    }

    /// Recompute the quote for a pair
    pub fn compute_pair(&self, pair: &Pair) -> Result<EdgeQuote, EdgeSkip> {
        self.compute_pair_at(pair, Utc::now())
    }

    /// Recompute against an explicit clock (for testing)
    pub fn compute_pair_at(&self, pair: &Pair, now: DateTime<Utc>) -> Result<EdgeQuote, EdgeSkip> {
        let book_a = self
            .books
            .latest(pair.market_a.venue, &pair.market_a.market_id)
            .ok_or(EdgeSkip::MissingBook(pair.market_a.venue))?;
        let book_b = self
            .books
            .latest(pair.market_b.venue, &pair.market_b.market_id)
            .ok_or(EdgeSkip::MissingBook(pair.market_b.venue))?;

        for book in [&book_a, &book_b] {
            if book.age_ms(now) > self.freshness_budget_ms as i64 {
                return Err(EdgeSkip::StaleBook(book.venue));
            }
        }

        let pack_a = self
            .registry
            .fee_pack(pair.market_a.venue)
            .ok_or(EdgeSkip::MissingFeePack(pair.market_a.venue))?;
        let pack_b = self
            .registry
            .fee_pack(pair.market_b.venue)
            .ok_or(EdgeSkip::MissingFeePack(pair.market_b.venue))?;

        let hint = self.board.get(pair.pair_id);

        compute_edge(
            pair,
            &book_a,
            &book_b,
            &pack_a,
            &pack_b,
            self.intended_qty,
            hint.leader,
            hint.confidence,
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Level;
    use crate::registry::{FeePack, Market, VenueId};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn market(venue: VenueId, market_id: &str, now: DateTime<Utc>) -> Market {
        Market {
            venue,
            market_id: market_id.to_string(),
            symbol: "btc-above-100k".to_string(),
            close_time: now + Duration::hours(6),
            resolution_source: "coinbase".to_string(),
            binary: true,
            tick_cents: dec!(1),
            lot_size: 1,
        }
    }

    fn setup(now: DateTime<Utc>) -> (Arc<Registry>, Arc<BookCache>, Arc<LeaderBoard>, Pair) {
        let registry = Arc::new(Registry::new(dec!(0.92)));
        registry.publish_fee_pack(FeePack::free(VenueId::Polymarket));
        registry.publish_fee_pack(FeePack::free(VenueId::Kalshi));
        let pair = Pair {
            pair_id: Uuid::new_v4(),
            market_a: market(VenueId::Polymarket, "0xbtc", now),
            market_b: market(VenueId::Kalshi, "KXBTC", now),
            similarity_score: dec!(0.97),
            rules_passed: true,
            active: true,
        };
        (registry, Arc::new(BookCache::new(5_000, 120)), Arc::new(LeaderBoard::new()), pair)
    }

    fn push(
        books: &BookCache,
        venue: VenueId,
        market_id: &str,
        bid: rust_decimal::Decimal,
        ask: rust_decimal::Decimal,
        seq: u64,
        now: DateTime<Utc>,
    ) {
        books.apply(crate::book::BookSnapshot {
            venue,
            market_id: market_id.to_string(),
            received_at: now,
            venue_ts: now,
            bids: vec![Level::new(bid, 100)],
            asks: vec![Level::new(ask, 100)],
            seq,
        });
    }

    #[test]
    fn test_compute_pair_happy_path() {
        let now = Utc::now();
        let (registry, books, board, pair) = setup(now);
        push(&books, VenueId::Polymarket, "0xbtc", dec!(46), dec!(48), 1, now);
        push(&books, VenueId::Kalshi, "KXBTC", dec!(51), dec!(53), 1, now);

        let engine = SignalEngine::new(registry, books, board, 50, 2_000);
        let quote = engine.compute_pair_at(&pair, now).unwrap();
        assert_eq!(quote.gross_edge_cents, dec!(3));
        assert_eq!(quote.book_a_seq, 1);
        assert_eq!(quote.book_b_seq, 1);
    }

    #[test]
    fn test_compute_pair_missing_book() {
        let now = Utc::now();
        let (registry, books, board, pair) = setup(now);
        push(&books, VenueId::Polymarket, "0xbtc", dec!(46), dec!(48), 1, now);

        let engine = SignalEngine::new(registry, books, board, 50, 2_000);
        assert_eq!(
            engine.compute_pair_at(&pair, now).unwrap_err(),
            EdgeSkip::MissingBook(VenueId::Kalshi)
        );
    }

    #[test]
    fn test_compute_pair_refuses_stale_book() {
        let now = Utc::now();
        let (registry, books, board, pair) = setup(now);
        push(&books, VenueId::Polymarket, "0xbtc", dec!(46), dec!(48), 1, now);
        push(&books, VenueId::Kalshi, "KXBTC", dec!(51), dec!(53), 1, now);

        let engine = SignalEngine::new(registry, books, board, 50, 2_000);
        let later = now + Duration::seconds(3);
        assert!(matches!(
            engine.compute_pair_at(&pair, later).unwrap_err(),
            EdgeSkip::StaleBook(_)
        ));
    }

    #[test]
    fn test_compute_pair_missing_fee_pack() {
        let now = Utc::now();
        let (_, books, board, pair) = setup(now);
        let registry = Arc::new(Registry::new(dec!(0.92)));
        push(&books, VenueId::Polymarket, "0xbtc", dec!(46), dec!(48), 1, now);
        push(&books, VenueId::Kalshi, "KXBTC", dec!(51), dec!(53), 1, now);

        let engine = SignalEngine::new(registry, books, board, 50, 2_000);
        assert_eq!(
            engine.compute_pair_at(&pair, now).unwrap_err(),
            EdgeSkip::MissingFeePack(VenueId::Polymarket)
        );
    }
}
