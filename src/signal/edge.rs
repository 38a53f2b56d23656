//! Edge computation for a cross-venue pair
//!
//! Both tradeable packages of a pair are priced by walking book depth at the
//! intended size, then charged venue fees, frictions, and slippage. The
//! package with the greater net edge wins; a package whose legs cannot absorb
//! the intended size is infeasible.

use crate::book::{BookSnapshot, Level};
use crate::registry::{FeePack, Pair, PairId, PairSide, VenueId};
use crate::venue::TakerSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction a pair is traded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Package {
    /// Buy YES on market A, buy NO on market B
    AYesBNo,
    /// Buy YES on market B, buy NO on market A
    BYesANo,
}

impl Package {
    /// Pair slot holding this package's YES leg
    pub fn yes_side(self) -> PairSide {
        match self {
            Package::AYesBNo => PairSide::A,
            Package::BYesANo => PairSide::B,
        }
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Package::AYesBNo => write!(f, "a_yes_b_no"),
            Package::BYesANo => write!(f, "b_yes_a_no"),
        }
    }
}

/// One leg of a priced package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegPlan {
    pub venue: VenueId,
    pub market_id: String,
    pub side: TakerSide,
    /// Worst acceptable price from the depth walk, in cents
    pub limit_px_cents: Decimal,
    /// Top-of-book price at computation time, in cents
    pub top_px_cents: Decimal,
    /// Size-weighted average executable price, in cents
    pub vwap_cents: Decimal,
    pub qty: u64,
}

/// A fee-, friction- and slippage-adjusted quote for one pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeQuote {
    pub pair_id: PairId,
    pub ts: DateTime<Utc>,
    pub package: Package,
    pub intended_qty: u64,
    pub gross_edge_cents: Decimal,
    pub fees_cents: Decimal,
    pub friction_cents: Decimal,
    pub slippage_cents: Decimal,
    pub net_edge_cents: Decimal,
    /// Venue slot whose prices statistically lead, if stable
    pub leader: Option<PairSide>,
    pub leader_confidence: f64,
    pub fee_version_hash: String,
    pub book_a_seq: u64,
    pub book_b_seq: u64,
    /// YES leg then NO leg
    pub legs: [LegPlan; 2],
}

/// Why no quote was produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeSkip {
    #[error("no book for {0}")]
    MissingBook(VenueId),
    #[error("book for {0} exceeds freshness budget")]
    StaleBook(VenueId),
    #[error("no fee pack published for {0}")]
    MissingFeePack(VenueId),
    #[error("insufficient depth for intended size")]
    Infeasible,
}

#[derive(Debug, Clone, Copy)]
struct DepthWalk {
    vwap_cents: Decimal,
    worst_px_cents: Decimal,
    top_px_cents: Decimal,
}

/// Walk ask depth buying YES; `None` when cumulative size < `qty`
fn walk_yes(asks: &[Level], qty: u64) -> Option<DepthWalk> {
    walk(asks.iter().map(|l| (l.price_cents, l.size)), qty)
}

/// Walk bid depth buying NO (NO price = 100 - YES bid); `None` on short depth
fn walk_no(bids: &[Level], qty: u64) -> Option<DepthWalk> {
    walk(
        bids.iter().map(|l| (dec!(100) - l.price_cents, l.size)),
        qty,
    )
}

fn walk(levels: impl Iterator<Item = (Decimal, u64)>, qty: u64) -> Option<DepthWalk> {
    if qty == 0 {
        return None;
    }
    let mut remaining = qty;
    let mut notional = Decimal::ZERO;
    let mut top = None;
    let mut worst = Decimal::ZERO;

    for (px, size) in levels {
        if top.is_none() {
            top = Some(px);
        }
        let take = remaining.min(size);
        notional += px * Decimal::from(take);
        worst = px;
        remaining -= take;
        if remaining == 0 {
            break;
        }
    }

    if remaining > 0 {
        return None;
    }
    Some(DepthWalk {
        vwap_cents: notional / Decimal::from(qty),
        worst_px_cents: worst,
        top_px_cents: top?,
    })
}

struct PricedPackage {
    package: Package,
    gross: Decimal,
    fees: Decimal,
    friction: Decimal,
    slippage: Decimal,
    net: Decimal,
    legs: [LegPlan; 2],
}

fn price_package(
    pair: &Pair,
    package: Package,
    book_a: &BookSnapshot,
    book_b: &BookSnapshot,
    pack_a: &FeePack,
    pack_b: &FeePack,
    qty: u64,
) -> Option<PricedPackage> {
    let yes_slot = package.yes_side();
    let (yes_book, no_book) = match yes_slot {
        PairSide::A => (book_a, book_b),
        PairSide::B => (book_b, book_a),
    };
    let (yes_pack, no_pack) = match yes_slot {
        PairSide::A => (pack_a, pack_b),
        PairSide::B => (pack_b, pack_a),
    };
    let yes_market = pair.market(yes_slot);
    let no_market = pair.market(yes_slot.other());

    let yes_walk = walk_yes(&yes_book.asks, qty)?;
    let no_walk = walk_no(&no_book.bids, qty)?;

    let gross = dec!(100) - (yes_walk.vwap_cents + no_walk.vwap_cents);

    let fees = yes_pack.taker_fee_cents(yes_walk.vwap_cents)
        + no_pack.taker_fee_cents(no_walk.vwap_cents)
        + yes_pack.profit_fee_cents(gross)
        + no_pack.profit_fee_cents(gross);

    let friction = yes_pack.friction_cents(yes_walk.vwap_cents, qty)
        + no_pack.friction_cents(no_walk.vwap_cents, qty);

    let slippage = (yes_walk.vwap_cents - yes_walk.top_px_cents)
        + (no_walk.vwap_cents - no_walk.top_px_cents);

    let net = gross - fees - friction - slippage;

    let legs = [
        LegPlan {
            venue: yes_market.venue,
            market_id: yes_market.market_id.clone(),
            side: TakerSide::BuyYes,
            limit_px_cents: yes_walk.worst_px_cents,
            top_px_cents: yes_walk.top_px_cents,
            vwap_cents: yes_walk.vwap_cents,
            qty,
        },
        LegPlan {
            venue: no_market.venue,
            market_id: no_market.market_id.clone(),
            side: TakerSide::BuyNo,
            limit_px_cents: no_walk.worst_px_cents,
            top_px_cents: no_walk.top_px_cents,
            vwap_cents: no_walk.vwap_cents,
            qty,
        },
    ];

    Some(PricedPackage {
        package,
        gross,
        fees,
        friction,
        slippage,
        net,
        legs,
    })
}

/// Price both packages and return a quote for the better one
#[allow(clippy::too_many_arguments)]
pub fn compute_edge(
    pair: &Pair,
    book_a: &BookSnapshot,
    book_b: &BookSnapshot,
    pack_a: &FeePack,
    pack_b: &FeePack,
    qty: u64,
    leader: Option<PairSide>,
    leader_confidence: f64,
    now: DateTime<Utc>,
) -> Result<EdgeQuote, EdgeSkip> {
    let p1 = price_package(pair, Package::AYesBNo, book_a, book_b, pack_a, pack_b, qty);
    let p2 = price_package(pair, Package::BYesANo, book_a, book_b, pack_a, pack_b, qty);

    let best = match (p1, p2) {
        (Some(a), Some(b)) => {
            if a.net >= b.net {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return Err(EdgeSkip::Infeasible),
    };

    Ok(EdgeQuote {
        pair_id: pair.pair_id,
        ts: now,
        package: best.package,
        intended_qty: qty,
        gross_edge_cents: best.gross,
        fees_cents: best.fees,
        friction_cents: best.friction,
        slippage_cents: best.slippage,
        net_edge_cents: best.net,
        leader,
        leader_confidence,
        fee_version_hash: format!("{}:{}", pack_a.version_hash(), pack_b.version_hash()),
        book_a_seq: book_a.seq,
        book_b_seq: book_b.seq,
        legs: best.legs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn market(venue: VenueId, market_id: &str) -> crate::registry::Market {
        crate::registry::Market {
            venue,
            market_id: market_id.to_string(),
            symbol: "btc-above-100k".to_string(),
            close_time: Utc::now() + Duration::hours(6),
            resolution_source: "coinbase".to_string(),
            binary: true,
            tick_cents: dec!(1),
            lot_size: 1,
        }
    }

    fn pair() -> Pair {
        Pair {
            pair_id: Uuid::new_v4(),
            market_a: market(VenueId::Polymarket, "0xbtc"),
            market_b: market(VenueId::Kalshi, "KXBTC"),
            similarity_score: dec!(0.97),
            rules_passed: true,
            active: true,
        }
    }

    fn book(venue: VenueId, market_id: &str, bids: Vec<Level>, asks: Vec<Level>) -> BookSnapshot {
        let now = Utc::now();
        BookSnapshot {
            venue,
            market_id: market_id.to_string(),
            received_at: now,
            venue_ts: now,
            bids,
            asks,
            seq: 1,
        }
    }

    #[test]
    fn test_walk_yes_single_level() {
        let walk = walk_yes(&[Level::new(dec!(48), 100)], 50).unwrap();
        assert_eq!(walk.vwap_cents, dec!(48));
        assert_eq!(walk.worst_px_cents, dec!(48));
        assert_eq!(walk.top_px_cents, dec!(48));
    }

    #[test]
    fn test_walk_yes_across_levels() {
        let levels = [Level::new(dec!(48), 60), Level::new(dec!(49), 60)];
        let walk = walk_yes(&levels, 100).unwrap();
        // (48*60 + 49*40) / 100 = 48.4
        assert_eq!(walk.vwap_cents, dec!(48.4));
        assert_eq!(walk.worst_px_cents, dec!(49));
        assert_eq!(walk.top_px_cents, dec!(48));
    }

    #[test]
    fn test_walk_short_depth_is_infeasible() {
        assert!(walk_yes(&[Level::new(dec!(48), 100)], 500).is_none());
        assert!(walk_yes(&[], 10).is_none());
    }

    #[test]
    fn test_walk_no_inverts_bids() {
        let walk = walk_no(&[Level::new(dec!(51), 100)], 50).unwrap();
        assert_eq!(walk.vwap_cents, dec!(49));
        assert_eq!(walk.top_px_cents, dec!(49));
    }

    #[test]
    fn test_edge_identity_holds() {
        let pair = pair();
        let book_a = book(
            VenueId::Polymarket,
            "0xbtc",
            vec![Level::new(dec!(46), 200)],
            vec![Level::new(dec!(48), 200)],
        );
        let book_b = book(
            VenueId::Kalshi,
            "KXBTC",
            vec![Level::new(dec!(51), 200)],
            vec![Level::new(dec!(53), 200)],
        );
        let mut pack_a = FeePack::free(VenueId::Polymarket);
        pack_a.taker_bps = dec!(100);
        let mut pack_b = FeePack::free(VenueId::Kalshi);
        pack_b.taker_fixed_cents = dec!(0.5);

        let quote = compute_edge(
            &pair,
            &book_a,
            &book_b,
            &pack_a,
            &pack_b,
            50,
            None,
            0.0,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(
            quote.net_edge_cents,
            quote.gross_edge_cents
                - quote.fees_cents
                - quote.friction_cents
                - quote.slippage_cents
        );
        // Buy YES at A (48) and NO at B (100 - 51 = 49): gross = 3.
        assert_eq!(quote.package, Package::AYesBNo);
        assert_eq!(quote.gross_edge_cents, dec!(3));
    }

    #[test]
    fn test_mirror_package_wins_when_better() {
        let pair = pair();
        // YES cheap on B, bids high on A: B_YES + A_NO is the profitable side.
        let book_a = book(
            VenueId::Polymarket,
            "0xbtc",
            vec![Level::new(dec!(53), 200)],
            vec![Level::new(dec!(55), 200)],
        );
        let book_b = book(
            VenueId::Kalshi,
            "KXBTC",
            vec![Level::new(dec!(42), 200)],
            vec![Level::new(dec!(44), 200)],
        );
        let pack = FeePack::free(VenueId::Polymarket);
        let quote = compute_edge(
            &pair,
            &book_a,
            &book_b,
            &pack,
            &FeePack::free(VenueId::Kalshi),
            50,
            None,
            0.0,
            Utc::now(),
        )
        .unwrap();

        // YES at B (44) + NO at A (100 - 53 = 47): gross = 9.
        assert_eq!(quote.package, Package::BYesANo);
        assert_eq!(quote.gross_edge_cents, dec!(9));
        assert_eq!(quote.legs[0].venue, VenueId::Kalshi);
        assert_eq!(quote.legs[1].venue, VenueId::Polymarket);
    }

    #[test]
    fn test_slippage_charges_depth_walk() {
        let pair = pair();
        let book_a = book(
            VenueId::Polymarket,
            "0xbtc",
            vec![Level::new(dec!(40), 200)],
            vec![Level::new(dec!(44), 50), Level::new(dec!(46), 200)],
        );
        let book_b = book(
            VenueId::Kalshi,
            "KXBTC",
            vec![Level::new(dec!(52), 200)],
            vec![Level::new(dec!(54), 200)],
        );
        let quote = compute_edge(
            &pair,
            &book_a,
            &book_b,
            &FeePack::free(VenueId::Polymarket),
            &FeePack::free(VenueId::Kalshi),
            100,
            None,
            0.0,
            Utc::now(),
        )
        .unwrap();

        // YES vwap = (44*50 + 46*50)/100 = 45, top = 44 -> slippage 1.
        assert_eq!(quote.slippage_cents, dec!(1));
        assert_eq!(quote.legs[0].limit_px_cents, dec!(46));
    }

    #[test]
    fn test_both_infeasible() {
        let pair = pair();
        let book_a = book(
            VenueId::Polymarket,
            "0xbtc",
            vec![Level::new(dec!(46), 10)],
            vec![Level::new(dec!(48), 10)],
        );
        let book_b = book(
            VenueId::Kalshi,
            "KXBTC",
            vec![Level::new(dec!(51), 10)],
            vec![Level::new(dec!(53), 10)],
        );
        let err = compute_edge(
            &pair,
            &book_a,
            &book_b,
            &FeePack::free(VenueId::Polymarket),
            &FeePack::free(VenueId::Kalshi),
            500,
            None,
            0.0,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, EdgeSkip::Infeasible);
    }

    #[test]
    fn test_equal_mids_leave_no_edge() {
        let pair = pair();
        // Same mid (50) on both venues with a 2c spread each.
        let book_a = book(
            VenueId::Polymarket,
            "0xbtc",
            vec![Level::new(dec!(49), 500)],
            vec![Level::new(dec!(51), 500)],
        );
        let book_b = book(
            VenueId::Kalshi,
            "KXBTC",
            vec![Level::new(dec!(49), 500)],
            vec![Level::new(dec!(51), 500)],
        );
        let quote = compute_edge(
            &pair,
            &book_a,
            &book_b,
            &FeePack::free(VenueId::Polymarket),
            &FeePack::free(VenueId::Kalshi),
            50,
            None,
            0.0,
            Utc::now(),
        )
        .unwrap();

        // Buying YES at 51 and NO at 100-49=51 costs 102: negative edge.
        assert!(quote.net_edge_cents < Decimal::ZERO);
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let pair = pair();
        let book_a = book(
            VenueId::Polymarket,
            "0xbtc",
            vec![Level::new(dec!(46), 200)],
            vec![Level::new(dec!(48), 200)],
        );
        let book_b = book(
            VenueId::Kalshi,
            "KXBTC",
            vec![Level::new(dec!(51), 200)],
            vec![Level::new(dec!(53), 200)],
        );
        let mut pack_a = FeePack::free(VenueId::Polymarket);
        pack_a.taker_bps = dec!(70);
        let pack_b = FeePack::free(VenueId::Kalshi);
        let ts = Utc::now();

        let q1 = compute_edge(&pair, &book_a, &book_b, &pack_a, &pack_b, 50, None, 0.0, ts)
            .unwrap();
        let q2 = compute_edge(&pair, &book_a, &book_b, &pack_a, &pack_b, 50, None, 0.0, ts)
            .unwrap();

        assert_eq!(q1.net_edge_cents, q2.net_edge_cents);
        assert_eq!(q1.fee_version_hash, q2.fee_version_hash);
        assert_eq!(q1.package, q2.package);
    }
}
