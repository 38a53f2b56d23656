//! Shared harness: full paper wiring of the trading loop

// Each scenario binary uses a different slice of the harness.
#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use pk_arb::book::BookCache;
use pk_arb::config::{Config, FeeParams};
use pk_arb::events::{Event, EventBus, EventTap};
use pk_arb::exec::{HedgeEngine, PositionBook};
use pk_arb::ops::HealthRegistry;
use pk_arb::orchestrator::Orchestrator;
use pk_arb::registry::{Market, Pair, PairId, Registry, VenueId};
use pk_arb::risk::{AdmissionController, HedgeStats, LiveHedges};
use pk_arb::signal::{spawn_leadlag_worker, LeadLagAnalyzer, LeaderBoard, SignalEngine};
use pk_arb::venue::{SimVenue, VenueAdapter};
use rust_decimal_macros::dec;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub struct App {
    pub registry: Arc<Registry>,
    pub books: Arc<BookCache>,
    pub board: Arc<LeaderBoard>,
    pub health: Arc<HealthRegistry>,
    pub live: Arc<LiveHedges>,
    pub positions: Arc<RwLock<PositionBook>>,
    pub bus: EventBus,
    pub poly: Arc<SimVenue>,
    pub kalshi: Arc<SimVenue>,
    pub pair_id: PairId,
    pub leadlag_tx: mpsc::Sender<PairId>,
    shutdown: watch::Sender<bool>,
}

impl App {
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub fn demo_pair() -> Pair {
    let now = Utc::now();
    let market = |venue: VenueId, market_id: &str| Market {
        venue,
        market_id: market_id.to_string(),
        symbol: "btc-above-100k".to_string(),
        close_time: now + ChronoDuration::hours(12),
        resolution_source: "coinbase".to_string(),
        binary: true,
        tick_cents: dec!(1),
        lot_size: 1,
    };
    Pair {
        pair_id: Uuid::new_v4(),
        market_a: market(VenueId::Polymarket, "0xbtc100k"),
        market_b: market(VenueId::Kalshi, "KXBTC-100K"),
        similarity_score: dec!(0.97),
        rules_passed: true,
        active: true,
    }
}

/// Start the full paper stack with the given config overrides applied
pub async fn start(mutate: impl FnOnce(&mut Config)) -> App {
    let mut config = Config::default();
    // Test-friendly baselines; scenarios override further.
    config.risk.min_net_edge_cents = dec!(1.5);
    config.signal.intended_qty = 50;
    config.fees.polymarket = FeeParams {
        taker_fixed_cents: dec!(0.5),
        ..FeeParams::default()
    };
    config.fees.kalshi = FeeParams {
        taker_fixed_cents: dec!(0.5),
        ..FeeParams::default()
    };
    mutate(&mut config);

    let registry = Arc::new(Registry::new(config.pairs.accept_score));
    registry.publish_fee_pack(config.fees.polymarket.to_pack(VenueId::Polymarket));
    registry.publish_fee_pack(config.fees.kalshi.to_pack(VenueId::Kalshi));
    let pair_id = registry.ingest_pair(demo_pair()).unwrap();

    let books = Arc::new(BookCache::new(
        config.signal.bar_duration_ms,
        config.signal.xcorr_window_bars,
    ));
    let board = Arc::new(LeaderBoard::new());
    let health = Arc::new(HealthRegistry::new());
    let bus = EventBus::default();
    let live = Arc::new(LiveHedges::new(config.risk.pairs_max));
    let stats = Arc::new(HedgeStats::default());
    let positions = Arc::new(RwLock::new(PositionBook::new()));

    let poly = SimVenue::new(VenueId::Polymarket);
    let kalshi = SimVenue::new(VenueId::Kalshi);
    let fee = config.fees.polymarket.taker_fixed_cents;
    poly.update_behavior(|b| b.fee_per_contract_cents = fee);
    let fee = config.fees.kalshi.taker_fixed_cents;
    kalshi.update_behavior(|b| b.fee_per_contract_cents = fee);

    let engine = HedgeEngine::new(
        vec![
            poly.clone() as Arc<dyn VenueAdapter>,
            kalshi.clone() as Arc<dyn VenueAdapter>,
        ],
        Arc::clone(&books),
        Arc::clone(&positions),
        Arc::clone(&health),
        bus.clone(),
        config.exec_params(),
    );
    engine.start_fill_pumps();

    let signal = SignalEngine::new(
        Arc::clone(&registry),
        Arc::clone(&books),
        Arc::clone(&board),
        config.signal.intended_qty,
        config.signal.freshness_budget_ms,
    );

    let risk = Arc::new(AdmissionController::new(
        Arc::clone(&registry),
        Arc::clone(&books),
        Arc::clone(&health),
        Arc::clone(&live),
        Arc::clone(&stats),
        Arc::clone(&positions),
        bus.clone(),
        config.risk_params(),
    ));

    let (leadlag_tx, leadlag_rx) = mpsc::channel(256);
    spawn_leadlag_worker(
        Arc::clone(&books),
        Arc::clone(&registry),
        Arc::clone(&board),
        leadlag_rx,
        LeadLagAnalyzer::new(
            config.signal.xcorr_window_bars,
            config.signal.xcorr_max_lag_bars,
            config.signal.min_correlation,
        ),
    );

    let orchestrator = Orchestrator {
        registry: Arc::clone(&registry),
        books: Arc::clone(&books),
        signal,
        risk,
        engine,
        health: Arc::clone(&health),
        bus: bus.clone(),
        venue_a: poly.clone(),
        venue_b: kalshi.clone(),
        leadlag_tx: leadlag_tx.clone(),
        recorder: None,
        position_snapshot_secs: 3600,
    };
    orchestrator.subscribe_active().await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = orchestrator.run(shutdown_rx).await;
    });

    App {
        registry,
        books,
        board,
        health,
        live,
        positions,
        bus,
        poly,
        kalshi,
        pair_id,
        leadlag_tx,
        shutdown: shutdown_tx,
    }
}

/// Wait for the first event matching the predicate
pub async fn wait_for(
    tap: &mut EventTap,
    timeout_ms: u64,
    mut pred: impl FnMut(&Event) -> bool,
) -> Option<Event> {
    tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), async {
        loop {
            match tap.next().await {
                Some(event) if pred(&event) => return Some(event),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Collect every event already queued plus those arriving within the window
pub async fn drain_for(tap: &mut EventTap, window_ms: u64) -> Vec<Event> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(window_ms);
    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        match tokio::time::timeout(deadline - now, tap.next()).await {
            Ok(Some(event)) => events.push(event),
            _ => break,
        }
    }
    events
}
