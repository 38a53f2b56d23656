//! Run command: wire the live components and drive the trading loop
//!
//! Paper mode runs against in-process sim venues fed by a synthetic quoter,
//! which exercises the full signal -> risk -> execution path without venue
//! credentials. Live adapters plug into the same orchestrator.

use crate::book::{BookCache, Level};
use crate::config::{Config, ExecutionMode};
use crate::data::{spawn_recorder, RecorderConfig};
use crate::events::EventBus;
use crate::exec::{HedgeEngine, PositionBook};
use crate::ops::HealthRegistry;
use crate::orchestrator::Orchestrator;
use crate::registry::{Market, Pair, PairFile, Registry, VenueId};
use crate::risk::{AdmissionController, HedgeStats, LiveHedges};
use crate::signal::{spawn_leadlag_worker, LeadLagAnalyzer, LeaderBoard, SignalEngine};
use crate::venue::{SimVenue, VenueAdapter};
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0")]
    pub duration_secs: u64,

    /// Run without writing the trade journal
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        if config.execution.mode == ExecutionMode::Live {
            anyhow::bail!("live venue adapters require credentials; run in paper mode");
        }

        let registry = Arc::new(Registry::new(config.pairs.accept_score));
        registry.publish_fee_pack(config.fees.polymarket.to_pack(VenueId::Polymarket));
        registry.publish_fee_pack(config.fees.kalshi.to_pack(VenueId::Kalshi));

        let pairs = match &config.pairs.file {
            Some(path) => PairFile::load(path)?.pairs,
            None => vec![demo_pair()],
        };
        for pair in pairs {
            let symbol = pair.market_a.symbol.clone();
            match registry.ingest_pair(pair) {
                Ok(pair_id) => tracing::info!(pair = %pair_id, symbol = %symbol, "Pair active"),
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Pair refused"),
            }
        }

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
        let analyzer = LeadLagAnalyzer::new(
            config.signal.xcorr_window_bars,
            config.signal.xcorr_max_lag_bars,
            config.signal.min_correlation,
        );
        spawn_leadlag_worker(
            Arc::clone(&books),
            Arc::clone(&registry),
            Arc::clone(&board),
            leadlag_rx,
            analyzer,
        );

        let recorder = if config.data.capture_enabled && !self.dry_run {
            let (handle, _task) = spawn_recorder(RecorderConfig {
                output_dir: config.data.output_dir.clone(),
                rotation_interval_secs: config.data.rotation_interval_secs,
                buffer_size: config.data.buffer_size,
                flush_interval_secs: config.data.flush_interval_secs,
            });
            Some(handle)
        } else {
            None
        };

        let orchestrator = Orchestrator {
            registry: Arc::clone(&registry),
            books,
            signal,
            risk,
            engine,
            health,
            bus: bus.clone(),
            venue_a: poly.clone(),
            venue_b: kalshi.clone(),
            leadlag_tx,
            recorder,
            position_snapshot_secs: config.data.position_snapshot_secs,
        };
        orchestrator.subscribe_active().await?;

        // Synthetic quoter keeps the paper venues alive.
        let quoter = spawn_paper_quoter(Arc::clone(&registry), poly, kalshi);

        // Event logger: what an external observer would see.
        let mut tap = bus.subscribe();
        tokio::spawn(async move {
            while let Some(event) = tap.next().await {
                match event {
                    crate::events::Event::TradeSettled(r) => {
                        tracing::info!(record = %r.record_id, edge = %r.realized_edge_cents, "Trade settled");
                    }
                    crate::events::Event::TradeUnwound(r) => {
                        tracing::warn!(record = %r.record_id, reason = ?r.reason, "Trade unwound");
                    }
                    crate::events::Event::TradeFailed(r) => {
                        tracing::error!(record = %r.record_id, residual = r.residual_qty, "Trade failed");
                    }
                    _ => {}
                }
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let duration = self.duration_secs;
        tokio::spawn(async move {
            if duration > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(duration)).await;
            } else {
                let _ = tokio::signal::ctrl_c().await;
            }
            let _ = shutdown_tx.send(true);
        });

        tracing::info!(dry_run = self.dry_run, "Paper trading loop started");
        orchestrator.run(shutdown_rx).await?;
        quoter.abort();
        Ok(())
    }
}

/// A demo pair so paper mode trades out of the box
fn demo_pair() -> Pair {
    let now = Utc::now();
    let market = |venue: VenueId, market_id: &str| Market {
        venue,
        market_id: market_id.to_string(),
        symbol: "btc-above-100k-2025".to_string(),
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

/// Push a slow random-walk of quotes onto both paper venues. Most updates
/// quote the venues in line; every so often the walk opens a spread wide
/// enough to admit.
fn spawn_paper_quoter(
    registry: Arc<Registry>,
    poly: Arc<SimVenue>,
    kalshi: Arc<SimVenue>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick: u64 = 0;
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(250));
        loop {
            interval.tick().await;
            tick += 1;

            // Deterministic drift plus an occasional dislocation.
            let phase = (tick % 120) as i64;
            let drift = (phase - 60).abs() - 30; // -30..=30 over the cycle
            let mid = dec!(50) + Decimal::from(drift) / dec!(10);
            let dislocated = tick % 40 == 0;
            let kalshi_mid = if dislocated { mid + dec!(6) } else { mid + dec!(1) };

            for pair in registry.active_pairs() {
                poly.push_book(
                    &pair.market_a.market_id,
                    vec![Level::new(mid - dec!(1), 500)],
                    vec![Level::new(mid + dec!(1), 500)],
                );
                kalshi.push_book(
                    &pair.market_b.market_id,
                    vec![Level::new(kalshi_mid - dec!(1), 500)],
                    vec![Level::new(kalshi_mid + dec!(1), 500)],
                );
            }
        }
    })
}
