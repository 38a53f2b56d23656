//! Two-leg hedged execution state machine
//!
//! State flow per intent:
//! Ready -> PlacingPrimary -> PlacingHedge -> AwaitingFills -> Settled
//! with Unwinding taken on hedge rejection, deadline expiry, adverse moves,
//! or operator halts, and Failed as the terminal escape hatch. Outside
//! AwaitingFills and Unwinding a pair never holds directional exposure.

use super::positions::PositionBook;
use super::types::{ExecutionIntent, LegStatus, Outcome, TradeReason, TradeRecord};
use crate::book::BookCache;
use crate::events::{Event, EventBus};
use crate::ops::HealthRegistry;
use crate::registry::VenueId;
use crate::signal::LegPlan;
use crate::venue::{Fill, OrderIntent, TakerSide, VenueAdapter};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

/// Execution timing and unwind parameters
#[derive(Debug, Clone)]
pub struct ExecParams {
    pub hedge_timeout_ms: u64,
    pub unwind_budget_ms: u64,
    pub unwind_max_retries: u32,
    pub backoff_max_ms: u64,
    pub adverse_move_cents: Decimal,
    pub adverse_move_duration_ms: u64,
}

impl Default for ExecParams {
    fn default() -> Self {
        Self {
            hedge_timeout_ms: 250,
            unwind_budget_ms: 800,
            unwind_max_retries: 3,
            backoff_max_ms: 800,
            adverse_move_cents: dec!(1.5),
            adverse_move_duration_ms: 5_000,
        }
    }
}

/// Routes venue fills to the execution task awaiting them.
///
/// Fills can arrive before the waiter registers (the ack and the fill race),
/// so unclaimed fills are parked by order id until claimed.
#[derive(Default)]
struct FillRouter {
    waiters: Mutex<HashMap<Uuid, mpsc::UnboundedSender<Fill>>>,
    unclaimed: Mutex<HashMap<Uuid, Vec<Fill>>>,
}

impl FillRouter {
    fn register(&self, order_id: Uuid) -> mpsc::UnboundedReceiver<Fill> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(parked) = self
            .unclaimed
            .lock()
            .expect("fill router poisoned")
            .remove(&order_id)
        {
            for fill in parked {
                let _ = tx.send(fill);
            }
        }
        self.waiters
            .lock()
            .expect("fill router poisoned")
            .insert(order_id, tx);
        rx
    }

    fn deregister(&self, order_id: Uuid) {
        self.waiters
            .lock()
            .expect("fill router poisoned")
            .remove(&order_id);
        self.unclaimed
            .lock()
            .expect("fill router poisoned")
            .remove(&order_id);
    }

    fn route(&self, fill: Fill) {
        let waiters = self.waiters.lock().expect("fill router poisoned");
        if let Some(tx) = waiters.get(&fill.order_id) {
            let _ = tx.send(fill);
        } else {
            drop(waiters);
            self.unclaimed
                .lock()
                .expect("fill router poisoned")
                .entry(fill.order_id)
                .or_default()
                .push(fill);
        }
    }
}

/// Hedged execution engine
pub struct HedgeEngine {
    adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
    books: Arc<BookCache>,
    positions: Arc<RwLock<PositionBook>>,
    health: Arc<HealthRegistry>,
    bus: EventBus,
    params: ExecParams,
    router: Arc<FillRouter>,
}

impl HedgeEngine {
    pub fn new(
        adapters: Vec<Arc<dyn VenueAdapter>>,
        books: Arc<BookCache>,
        positions: Arc<RwLock<PositionBook>>,
        health: Arc<HealthRegistry>,
        bus: EventBus,
        params: ExecParams,
    ) -> Arc<Self> {
        let adapters = adapters.into_iter().map(|a| (a.venue(), a)).collect();
        Arc::new(Self {
            adapters,
            books,
            positions,
            health,
            bus,
            params,
            router: Arc::new(FillRouter::default()),
        })
    }

    /// Read-only view of positions for risk and snapshots
    pub fn positions(&self) -> Arc<RwLock<PositionBook>> {
        Arc::clone(&self.positions)
    }

    /// Spawn one fill pump per adapter. Pumps apply fills to positions in
    /// arrival order, publish LegFilled, and hand them to the router.
    pub fn start_fill_pumps(self: &Arc<Self>) {
        for adapter in self.adapters.values() {
            let mut rx = adapter.fills();
            let engine = Arc::clone(self);
            let venue = adapter.venue();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(fill) => {
                            let fresh = engine
                                .positions
                                .write()
                                .expect("position book poisoned")
                                .apply(&fill);
                            if fresh {
                                engine.bus.publish(Event::LegFilled(fill.clone()));
                                engine.router.route(fill);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::error!(venue = %venue, missed = n, "Fill pump lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
    }

    fn adapter(&self, venue: VenueId) -> Arc<dyn VenueAdapter> {
        Arc::clone(self.adapters.get(&venue).expect("adapter registered"))
    }

    /// Drive one admitted intent to a terminal state
    pub async fn execute(&self, intent: ExecutionIntent) -> TradeRecord {
        let started = tokio::time::Instant::now();
        let mut ctx = HedgeContext::new();

        let deadline = intent.deadline;

        // PlacingPrimary
        let primary = &intent.legs[0];
        match self.place_leg(primary, deadline).await {
            LegPlacement::Acked(order_id) => {
                ctx.primary_order = Some(order_id);
                ctx.primary_status = LegStatus::Unfilled;
            }
            LegPlacement::Rejected => {
                ctx.primary_status = LegStatus::Rejected;
                return self
                    .finish(intent, ctx, Outcome::Failed, Some(TradeReason::PrimaryRejected), started)
                    .await;
            }
            LegPlacement::DeadlineExpired => {
                return self
                    .finish(intent, ctx, Outcome::Failed, Some(TradeReason::PrimaryTimeout), started)
                    .await;
            }
        }
        let mut primary_rx = self.router.register(ctx.primary_order.expect("acked"));

        // PlacingHedge
        let hedge = &intent.legs[1];
        match self.place_leg(hedge, deadline).await {
            LegPlacement::Acked(order_id) => {
                ctx.hedge_order = Some(order_id);
                ctx.hedge_status = LegStatus::Unfilled;
            }
            LegPlacement::Rejected => {
                ctx.hedge_status = LegStatus::Rejected;
                return self
                    .unwind(intent, ctx, TradeReason::HedgeRejected, &mut primary_rx, None, started)
                    .await;
            }
            LegPlacement::DeadlineExpired => {
                return self
                    .unwind(intent, ctx, TradeReason::HedgeTimeout, &mut primary_rx, None, started)
                    .await;
            }
        }
        let mut hedge_rx = self.router.register(ctx.hedge_order.expect("acked"));

        // AwaitingFills
        let entry_mids = [self.current_mid(primary), self.current_mid(hedge)];
        let mut adverse_since: Option<tokio::time::Instant> = None;

        loop {
            if ctx.primary_filled >= intent.qty && ctx.hedge_filled >= intent.qty {
                ctx.primary_status = LegStatus::Filled;
                ctx.hedge_status = LegStatus::Filled;
                return self.finish(intent, ctx, Outcome::Committed, None, started).await;
            }

            if Utc::now() >= deadline {
                return self
                    .unwind(
                        intent,
                        ctx,
                        TradeReason::HedgeTimeout,
                        &mut primary_rx,
                        Some(&mut hedge_rx),
                        started,
                    )
                    .await;
            }

            if self.health.is_halted(primary.venue) || self.health.is_halted(hedge.venue) {
                return self
                    .unwind(
                        intent,
                        ctx,
                        TradeReason::OperatorHalt,
                        &mut primary_rx,
                        Some(&mut hedge_rx),
                        started,
                    )
                    .await;
            }

            if self.adverse_move_sustained(&intent, &ctx, &entry_mids, &mut adverse_since) {
                return self
                    .unwind(
                        intent,
                        ctx,
                        TradeReason::AdverseMove,
                        &mut primary_rx,
                        Some(&mut hedge_rx),
                        started,
                    )
                    .await;
            }

            tokio::select! {
                Some(fill) = primary_rx.recv() => {
                    ctx.primary_filled += fill.qty;
                    ctx.fills.push(fill);
                }
                Some(fill) = hedge_rx.recv() => {
                    ctx.hedge_filled += fill.qty;
                    ctx.fills.push(fill);
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
            }
        }
    }

    async fn place_leg(&self, leg: &LegPlan, deadline: DateTime<Utc>) -> LegPlacement {
        let remaining = deadline - Utc::now();
        let Ok(remaining) = remaining.to_std() else {
            return LegPlacement::DeadlineExpired;
        };

        let order = OrderIntent {
            intent_id: Uuid::new_v4(),
            venue: leg.venue,
            market_id: leg.market_id.clone(),
            side: leg.side,
            limit_px_cents: leg.limit_px_cents,
            qty: leg.qty,
            created_at: Utc::now(),
            deadline,
        };

        match timeout(remaining, self.adapter(leg.venue).place_taker(order)).await {
            Ok(Ok(ack)) => LegPlacement::Acked(ack.venue_order_id),
            Ok(Err(rejection)) => {
                tracing::warn!(venue = %leg.venue, market = %leg.market_id, %rejection, "Leg rejected");
                LegPlacement::Rejected
            }
            Err(_) => LegPlacement::DeadlineExpired,
        }
    }

    /// Mid price of a leg's market in the leg's own price space
    fn current_mid(&self, leg: &LegPlan) -> Option<Decimal> {
        let book = self.books.latest(leg.venue, &leg.market_id)?;
        let yes_mid = book.mid_cents()?;
        Some(match leg.side {
            TakerSide::BuyYes => yes_mid,
            TakerSide::BuyNo => dec!(100) - yes_mid,
        })
    }

    /// True once the mid on an unfilled leg has moved against us beyond the
    /// configured size for the configured duration
    fn adverse_move_sustained(
        &self,
        intent: &ExecutionIntent,
        ctx: &HedgeContext,
        entry_mids: &[Option<Decimal>; 2],
        adverse_since: &mut Option<tokio::time::Instant>,
    ) -> bool {
        let filled = [ctx.primary_filled, ctx.hedge_filled];
        let mut adverse_now = false;

        for (i, leg) in intent.legs.iter().enumerate() {
            if filled[i] >= intent.qty {
                continue;
            }
            let (Some(entry), Some(current)) = (entry_mids[i], self.current_mid(leg)) else {
                continue;
            };
            // Both legs are buys; the price moving up is against us.
            if current - entry >= self.params.adverse_move_cents {
                adverse_now = true;
            }
        }

        if !adverse_now {
            *adverse_since = None;
            return false;
        }
        let since = adverse_since.get_or_insert_with(tokio::time::Instant::now);
        since.elapsed() >= std::time::Duration::from_millis(self.params.adverse_move_duration_ms)
    }

    /// Cancel residual orders, liquidate any one-sided fills, and settle the
    /// record as Unwound or Failed(LegRisk)
    async fn unwind(
        &self,
        intent: ExecutionIntent,
        mut ctx: HedgeContext,
        reason: TradeReason,
        primary_rx: &mut mpsc::UnboundedReceiver<Fill>,
        mut hedge_rx: Option<&mut mpsc::UnboundedReceiver<Fill>>,
        started: tokio::time::Instant,
    ) -> TradeRecord {
        tracing::warn!(
            intent = %intent.intent_id,
            pair = %intent.pair_id,
            %reason,
            "Unwinding hedge"
        );

        // Cancel whatever is still open, then drain racing fills.
        for (order, filled) in [
            (ctx.primary_order, ctx.primary_filled),
            (ctx.hedge_order, ctx.hedge_filled),
        ] {
            if let Some(order_id) = order {
                if filled < intent.qty {
                    let venue = if Some(order_id) == ctx.primary_order {
                        intent.legs[0].venue
                    } else {
                        intent.legs[1].venue
                    };
                    if let Err(e) = self.adapter(venue).cancel(order_id).await {
                        tracing::warn!(order = %order_id, error = %e, "Cancel failed");
                    }
                }
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        while let Ok(fill) = primary_rx.try_recv() {
            ctx.primary_filled += fill.qty;
            ctx.fills.push(fill);
        }
        if let Some(rx) = hedge_rx.as_deref_mut() {
            while let Ok(fill) = rx.try_recv() {
                ctx.hedge_filled += fill.qty;
                ctx.fills.push(fill);
            }
        }

        ctx.primary_status = leg_status(ctx.primary_status, ctx.primary_filled, intent.qty);
        ctx.hedge_status = leg_status(ctx.hedge_status, ctx.hedge_filled, intent.qty);

        let unwind_deadline = intent.created_at
            + Duration::milliseconds(
                (self.params.hedge_timeout_ms + self.params.unwind_budget_ms) as i64,
            );

        // Offset the overfilled leg on its own market: buying the opposite
        // token pins the pair back to flat.
        let mut residual: i64 = ctx.primary_filled as i64 - ctx.hedge_filled as i64;
        let mut attempts = 0u32;
        let mut backoff = std::time::Duration::from_millis(100);

        while residual.abs() > 1
            && attempts < self.params.unwind_max_retries
            && Utc::now() < unwind_deadline
        {
            attempts += 1;
            let leg = if residual > 0 {
                &intent.legs[0]
            } else {
                &intent.legs[1]
            };
            let qty = residual.unsigned_abs();

            let offset_side = leg.side.offsetting();
            let limit_px = self
                .offset_limit_px(leg, offset_side)
                .unwrap_or_else(|| dec!(99));

            let order = OrderIntent {
                intent_id: Uuid::new_v4(),
                venue: leg.venue,
                market_id: leg.market_id.clone(),
                side: offset_side,
                limit_px_cents: limit_px,
                qty,
                created_at: Utc::now(),
                deadline: unwind_deadline,
            };

            match self.adapter(leg.venue).place_taker(order).await {
                Ok(ack) => {
                    let mut rx = self.router.register(ack.venue_order_id);
                    let wait = remaining_std(unwind_deadline)
                        .min(std::time::Duration::from_millis(200));
                    match timeout(wait, rx.recv()).await {
                        Ok(Some(fill)) => {
                            let delta = fill.qty as i64;
                            residual += if residual > 0 { -delta } else { delta };
                            ctx.fills.push(fill);
                        }
                        _ => {
                            let _ = self.adapter(leg.venue).cancel(ack.venue_order_id).await;
                        }
                    }
                    self.router.deregister(ack.venue_order_id);
                }
                Err(rejection) => {
                    tracing::warn!(venue = %leg.venue, %rejection, attempt = attempts, "Unwind leg rejected");
                }
            }

            if residual.abs() > 1 {
                tokio::time::sleep(backoff.min(remaining_std(unwind_deadline))).await;
                backoff = (backoff * 2)
                    .min(std::time::Duration::from_millis(self.params.backoff_max_ms));
            }
        }

        if residual.abs() <= 1 {
            ctx.residual = residual.unsigned_abs();
            self.finish(intent, ctx, Outcome::Unwound, Some(reason), started).await
        } else {
            ctx.residual = residual.unsigned_abs();
            let venue = if residual > 0 {
                intent.legs[0].venue
            } else {
                intent.legs[1].venue
            };
            tracing::error!(
                venue = %venue,
                residual = ctx.residual,
                "Unwind exhausted with residual exposure; halting venue"
            );
            self.health.set_halted(venue, true);
            self.bus.publish(Event::HaltRequested {
                venue,
                who: "leg-risk".to_string(),
            });
            self.finish(intent, ctx, Outcome::Failed, Some(TradeReason::LegRisk), started)
                .await
        }
    }

    /// Executable price for offsetting a leg at the current book
    fn offset_limit_px(&self, leg: &LegPlan, offset_side: TakerSide) -> Option<Decimal> {
        let book = self.books.latest(leg.venue, &leg.market_id)?;
        match offset_side {
            TakerSide::BuyYes => book.best_ask().map(|l| l.price_cents),
            TakerSide::BuyNo => book.best_bid().map(|l| dec!(100) - l.price_cents),
        }
    }

    async fn finish(
        &self,
        intent: ExecutionIntent,
        mut ctx: HedgeContext,
        outcome: Outcome,
        reason: Option<TradeReason>,
        started: tokio::time::Instant,
    ) -> TradeRecord {
        if let Some(order_id) = ctx.primary_order {
            self.router.deregister(order_id);
        }
        if let Some(order_id) = ctx.hedge_order {
            self.router.deregister(order_id);
        }
        if outcome == Outcome::Committed {
            ctx.primary_status = LegStatus::Filled;
            ctx.hedge_status = LegStatus::Filled;
        }

        let (matched, realized, slippage) = summarize(&intent, &ctx.fills, outcome);

        let record = TradeRecord {
            record_id: Uuid::new_v4(),
            pair_id: intent.pair_id,
            primary_status: ctx.primary_status,
            hedge_status: ctx.hedge_status,
            fills: ctx.fills.clone(),
            realized_edge_cents: realized,
            slippage_cents: slippage,
            fee_version_hash: intent.fee_version_hash.clone(),
            outcome,
            reason,
            residual_qty: ctx.residual,
            matched_qty: matched,
            completed_in_ms: started.elapsed().as_millis() as i64,
            completed_at: Utc::now(),
            intent,
        };

        match outcome {
            Outcome::Committed => self.bus.publish(Event::TradeSettled(record.clone())),
            Outcome::Unwound => self.bus.publish(Event::TradeUnwound(record.clone())),
            Outcome::Failed => self.bus.publish(Event::TradeFailed(record.clone())),
        }

        tracing::info!(
            record = %record.record_id,
            pair = %record.pair_id,
            ?outcome,
            realized_edge_cents = %record.realized_edge_cents,
            matched = record.matched_qty,
            residual = record.residual_qty,
            elapsed_ms = record.completed_in_ms,
            "Hedge terminal"
        );

        record
    }
}

enum LegPlacement {
    Acked(Uuid),
    Rejected,
    DeadlineExpired,
}

struct HedgeContext {
    fills: Vec<Fill>,
    primary_order: Option<Uuid>,
    hedge_order: Option<Uuid>,
    primary_filled: u64,
    hedge_filled: u64,
    primary_status: LegStatus,
    hedge_status: LegStatus,
    residual: u64,
}

impl HedgeContext {
    fn new() -> Self {
        Self {
            fills: Vec::new(),
            primary_order: None,
            hedge_order: None,
            primary_filled: 0,
            hedge_filled: 0,
            primary_status: LegStatus::Unplaced,
            hedge_status: LegStatus::Unplaced,
            residual: 0,
        }
    }
}

fn leg_status(current: LegStatus, filled: u64, qty: u64) -> LegStatus {
    match current {
        LegStatus::Rejected => LegStatus::Rejected,
        LegStatus::Unplaced => LegStatus::Unplaced,
        _ => {
            if filled >= qty {
                LegStatus::Filled
            } else if filled > 0 {
                LegStatus::PartiallyFilled
            } else {
                LegStatus::Cancelled
            }
        }
    }
}

fn remaining_std(deadline: DateTime<Utc>) -> std::time::Duration {
    (deadline - Utc::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Matched quantity, realised edge per contract, and realised slippage
fn summarize(
    intent: &ExecutionIntent,
    fills: &[Fill],
    outcome: Outcome,
) -> (u64, Decimal, Decimal) {
    let yes_qty: u64 = fills
        .iter()
        .filter(|f| f.side == TakerSide::BuyYes)
        .map(|f| f.qty)
        .sum();
    let no_qty: u64 = fills
        .iter()
        .filter(|f| f.side == TakerSide::BuyNo)
        .map(|f| f.qty)
        .sum();
    let matched = yes_qty.min(no_qty);

    let realized = if matched > 0 && outcome != Outcome::Failed {
        let notional: Decimal = fills
            .iter()
            .map(|f| f.px_cents * Decimal::from(f.qty))
            .sum();
        let fees: Decimal = fills.iter().map(|f| f.fee_paid_cents).sum();
        (dec!(100) * Decimal::from(matched) - notional - fees) / Decimal::from(matched)
    } else {
        Decimal::ZERO
    };

    let mut slippage = Decimal::ZERO;
    for leg in &intent.legs {
        let leg_fills: Vec<&Fill> = fills
            .iter()
            .filter(|f| f.venue == leg.venue && f.market_id == leg.market_id && f.side == leg.side)
            .collect();
        let qty: u64 = leg_fills.iter().map(|f| f.qty).sum();
        if qty == 0 {
            continue;
        }
        let notional: Decimal = leg_fills
            .iter()
            .map(|f| f.px_cents * Decimal::from(f.qty))
            .sum();
        slippage += notional / Decimal::from(qty) - leg.top_px_cents;
    }

    (matched, realized, slippage)
}
