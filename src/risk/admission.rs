//! Hard-predicate admission control
//!
//! Predicates run in a fixed order and the first failure names the reason.
//! An admitted quote becomes an execution intent with leader-ordered legs
//! and a hedging deadline.

use super::limits::{PnlMonitor, StopLimits};
use super::types::RejectReason;
use super::{HedgeStats, LiveHedges};
use crate::book::BookCache;
use crate::events::{Event, EventBus};
use crate::exec::{ExecutionIntent, PositionBook, TradeRecord};
use crate::ops::HealthRegistry;
use crate::registry::Registry;
use crate::signal::{EdgeQuote, LegPlan};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Admission parameters
#[derive(Debug, Clone, Deserialize)]
pub struct RiskParams {
    pub min_net_edge_cents: Decimal,
    pub freshness_budget_ms: u64,
    pub pairs_max: usize,
    pub venue_cap_usd: Decimal,
    pub per_contract_exposure_usd: Decimal,
    pub min_hedge_probability: f64,
    pub hedge_timeout_ms: u64,
    pub initial_equity_usd: Decimal,
    pub stops: StopLimits,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            min_net_edge_cents: dec!(2.5),
            freshness_budget_ms: 2_000,
            pairs_max: 8,
            venue_cap_usd: dec!(5000),
            per_contract_exposure_usd: dec!(250),
            min_hedge_probability: 0.99,
            hedge_timeout_ms: 250,
            initial_equity_usd: dec!(10000),
            stops: StopLimits::default(),
        }
    }
}

/// Gates every edge quote against live positions, health, and limits
pub struct AdmissionController {
    registry: Arc<Registry>,
    books: Arc<BookCache>,
    health: Arc<HealthRegistry>,
    live: Arc<LiveHedges>,
    stats: Arc<HedgeStats>,
    positions: Arc<RwLock<PositionBook>>,
    pnl: Mutex<PnlMonitor>,
    bus: EventBus,
    params: RiskParams,
}

impl AdmissionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        books: Arc<BookCache>,
        health: Arc<HealthRegistry>,
        live: Arc<LiveHedges>,
        stats: Arc<HedgeStats>,
        positions: Arc<RwLock<PositionBook>>,
        bus: EventBus,
        params: RiskParams,
    ) -> Self {
        let pnl = Mutex::new(PnlMonitor::new(params.initial_equity_usd, Utc::now()));
        Self {
            registry,
            books,
            health,
            live,
            stats,
            positions,
            pnl,
            bus,
            params,
        }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn equity_usd(&self) -> Decimal {
        self.pnl.lock().expect("pnl monitor poisoned").equity_usd()
    }

    /// Admit or reject a quote
    pub fn admit(&self, quote: &EdgeQuote) -> Result<ExecutionIntent, RejectReason> {
        self.admit_at(quote, Utc::now())
    }

    /// Admit against an explicit clock (for testing)
    pub fn admit_at(
        &self,
        quote: &EdgeQuote,
        now: DateTime<Utc>,
    ) -> Result<ExecutionIntent, RejectReason> {
        let pair = self
            .registry
            .pair(quote.pair_id)
            .filter(|p| p.active)
            .ok_or(RejectReason::PairInactive)?;

        let venues = [pair.market_a.venue, pair.market_b.venue];
        for venue in venues {
            if self.registry.fee_pack(venue).is_none() {
                return Err(RejectReason::MissingFeePack(venue));
            }
        }

        // An edge whose decomposition does not reproduce its net is a bug in
        // the producer; stop trading the pair rather than act on it.
        let recomputed = quote.gross_edge_cents
            - quote.fees_cents
            - quote.friction_cents
            - quote.slippage_cents;
        if recomputed != quote.net_edge_cents {
            tracing::error!(pair = %quote.pair_id, "Inconsistent edge decomposition");
            self.registry.set_pair_active(quote.pair_id, false);
            return Err(RejectReason::EdgeInconsistent);
        }

        // 1. Minimum net edge
        if quote.net_edge_cents < self.params.min_net_edge_cents {
            return Err(RejectReason::EdgeBelowMinimum {
                net: quote.net_edge_cents,
                min: self.params.min_net_edge_cents,
            });
        }

        // 2. Venue health and feed freshness
        for venue in venues {
            if self.health.is_down(venue) {
                return Err(RejectReason::VenueDown(venue));
            }
            if self.health.is_halted(venue) {
                return Err(RejectReason::VenueHalted(venue));
            }
        }
        for (venue, market_id) in [
            (pair.market_a.venue, &pair.market_a.market_id),
            (pair.market_b.venue, &pair.market_b.market_id),
        ] {
            if self
                .books
                .is_fresh(venue, market_id, now, self.params.freshness_budget_ms)
            {
                self.health.clear_stale(venue);
            } else {
                if self.health.note_stale(venue) {
                    self.bus.publish(Event::VenueDown(venue));
                }
                return Err(RejectReason::StaleFeed(venue));
            }
        }

        // 3 & 4. One live hedge per pair, bounded globally. Checked here and
        // reserved atomically after the remaining predicates pass.
        if self.live.is_live(quote.pair_id) {
            return Err(RejectReason::PairBusy);
        }
        if self.live.count() >= self.params.pairs_max {
            return Err(RejectReason::TooManyLiveHedges(self.params.pairs_max));
        }

        // 5 & 6. Post-trade notional caps
        {
            let positions = self.positions.read().expect("position book poisoned");
            for leg in &quote.legs {
                let add_usd =
                    Decimal::from(leg.qty) * leg.limit_px_cents / dec!(100);

                let venue_would = positions.venue_notional_usd(leg.venue) + add_usd;
                if venue_would > self.params.venue_cap_usd {
                    return Err(RejectReason::VenueCapExceeded {
                        venue: leg.venue,
                        would_usd: venue_would,
                        cap_usd: self.params.venue_cap_usd,
                    });
                }

                let contract_would =
                    positions.position(leg.venue, &leg.market_id).notional_usd() + add_usd;
                if contract_would > self.params.per_contract_exposure_usd {
                    return Err(RejectReason::ContractCapExceeded {
                        market_id: leg.market_id.clone(),
                        would_usd: contract_would,
                        cap_usd: self.params.per_contract_exposure_usd,
                    });
                }
            }
        }

        // 7. Drawdown stops
        if let Some(window) = self
            .pnl
            .lock()
            .expect("pnl monitor poisoned")
            .breached(&self.params.stops, now)
        {
            return Err(RejectReason::DrawdownStop(window));
        }

        // 8. Hedge completion probability on the hedge leg's venue
        let legs = order_legs(quote);
        let hedge_venue = legs[1].venue;
        let est = self.stats.probability(hedge_venue);
        if est < self.params.min_hedge_probability {
            return Err(RejectReason::HedgeProbabilityTooLow {
                est,
                min: self.params.min_hedge_probability,
            });
        }

        self.live.try_reserve(quote.pair_id)?;

        Ok(ExecutionIntent {
            intent_id: Uuid::new_v4(),
            pair_id: quote.pair_id,
            package: quote.package,
            qty: quote.intended_qty,
            legs,
            net_edge_cents: quote.net_edge_cents,
            fee_version_hash: quote.fee_version_hash.clone(),
            created_at: now,
            deadline: now + Duration::milliseconds(self.params.hedge_timeout_ms as i64),
        })
    }

    /// Fold a terminal trade back into risk state
    pub fn on_trade_record(&self, record: &TradeRecord) {
        self.on_trade_record_at(record, Utc::now());
    }

    pub fn on_trade_record_at(&self, record: &TradeRecord, now: DateTime<Utc>) {
        self.live.release(record.pair_id);

        let hedge_venue = record.intent.legs[1].venue;
        self.stats.record(
            hedge_venue,
            matches!(record.outcome, crate::exec::Outcome::Committed),
        );

        if record.matched_qty > 0 {
            let total = record.realized_edge_cents * Decimal::from(record.matched_qty);
            self.pnl
                .lock()
                .expect("pnl monitor poisoned")
                .record_realized_cents(total, now);
        }
    }
}

/// Order a quote's legs for execution: leader's leg first
fn order_legs(quote: &EdgeQuote) -> [LegPlan; 2] {
    let yes_leg = quote.legs[0].clone();
    let no_leg = quote.legs[1].clone();
    match quote.leader {
        Some(side) if side != quote.package.yes_side() => [no_leg, yes_leg],
        _ => [yes_leg, no_leg],
    }
}
