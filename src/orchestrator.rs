//! Trading loop orchestration
//!
//! One task owns the signal -> risk -> intent path so that per-pair edge
//! events keep the order of their triggering snapshots. The path is
//! non-suspending: executions are spawned, lead-lag work is shipped to its
//! worker, and journal writes go through a bounded channel.

use crate::book::{Applied, BookCache, BookSnapshot};
use crate::data::RecorderHandle;
use crate::events::{Event, EventBus};
use crate::exec::{HedgeEngine, Outcome, TradeRecord};
use crate::ops::HealthRegistry;
use crate::registry::{PairId, Registry};
use crate::risk::AdmissionController;
use crate::signal::{EdgeSkip, SignalEngine};
use crate::telemetry::{increment_counter, CounterMetric};
use crate::venue::{HealthEvent, VenueAdapter};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Wires the live components into the trading loop
pub struct Orchestrator {
    pub registry: Arc<Registry>,
    pub books: Arc<BookCache>,
    pub signal: SignalEngine,
    pub risk: Arc<AdmissionController>,
    pub engine: Arc<HedgeEngine>,
    pub health: Arc<HealthRegistry>,
    pub bus: EventBus,
    pub venue_a: Arc<dyn VenueAdapter>,
    pub venue_b: Arc<dyn VenueAdapter>,
    pub leadlag_tx: mpsc::Sender<PairId>,
    pub recorder: Option<RecorderHandle>,
    pub position_snapshot_secs: u64,
}

impl Orchestrator {
    /// Subscribe both adapters to the active pair set
    pub async fn subscribe_active(&self) -> anyhow::Result<()> {
        let mut a_markets = Vec::new();
        let mut b_markets = Vec::new();
        for pair in self.registry.active_pairs() {
            for market in [&pair.market_a, &pair.market_b] {
                let list = if market.venue == self.venue_a.venue() {
                    &mut a_markets
                } else {
                    &mut b_markets
                };
                list.push(market.market_id.clone());
                self.books.track(market.venue, &market.market_id);
            }
        }
        self.venue_a.subscribe(&a_markets).await?;
        self.venue_b.subscribe(&b_markets).await?;
        tracing::info!(
            a = a_markets.len(),
            b = b_markets.len(),
            "Subscribed to active pair markets"
        );
        Ok(())
    }

    /// Run until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut a_snaps = self.venue_a.snapshots();
        let mut b_snaps = self.venue_b.snapshots();
        let mut a_health = self.venue_a.health_events();
        let mut b_health = self.venue_b.health_events();

        let (records_tx, mut records_rx) = mpsc::channel::<TradeRecord>(64);

        let mut position_tick = tokio::time::interval(std::time::Duration::from_secs(
            self.position_snapshot_secs.max(1),
        ));
        position_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut a_open = true;
        let mut b_open = true;

        loop {
            tokio::select! {
                res = a_snaps.recv(), if a_open => {
                    match res {
                        Ok(snap) => self.on_snapshot(snap, &records_tx),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::error!(venue = %self.venue_a.venue(), missed = n, "Snapshot stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => a_open = false,
                    }
                }
                res = b_snaps.recv(), if b_open => {
                    match res {
                        Ok(snap) => self.on_snapshot(snap, &records_tx),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::error!(venue = %self.venue_b.venue(), missed = n, "Snapshot stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => b_open = false,
                    }
                }
                res = a_health.recv() => {
                    if let Ok(event) = res {
                        self.on_health(event);
                    }
                }
                res = b_health.recv() => {
                    if let Ok(event) = res {
                        self.on_health(event);
                    }
                }
                Some(record) = records_rx.recv() => {
                    self.on_record(&record);
                }
                _ = position_tick.tick() => {
                    self.snapshot_positions();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Trading loop shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a snapshot and recompute every pair it belongs to.
    ///
    /// This is the latency-critical section; it never suspends.
    fn on_snapshot(&self, snap: BookSnapshot, records_tx: &mpsc::Sender<TradeRecord>) {
        let venue = snap.venue;
        let market_id = snap.market_id.clone();

        match self.books.apply(snap) {
            Applied::StaleSeq | Applied::Crossed => return,
            Applied::Gap { missed } => {
                tracing::warn!(venue = %venue, market = %market_id, missed, "Sequence gap; resyncing");
                let adapter = self.adapter_for(venue);
                let market = market_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = adapter.subscribe(&[market]).await {
                        tracing::error!(error = %e, "Resync subscribe failed");
                    }
                });
            }
            Applied::Stored { bars_closed } => {
                if bars_closed > 0 {
                    for pair in self.registry.pairs_for_market(venue, &market_id) {
                        let _ = self.leadlag_tx.try_send(pair.pair_id);
                    }
                }
            }
        }

        let now = Utc::now();
        for pair in self.registry.pairs_for_market(venue, &market_id) {
            match self.signal.compute_pair_at(&pair, now) {
                Ok(quote) => {
                    increment_counter(CounterMetric::EdgesComputed);
                    self.bus.publish(Event::EdgeComputed(quote.clone()));

                    match self.risk.admit_at(&quote, now) {
                        Ok(intent) => {
                            increment_counter(CounterMetric::IntentsAdmitted);
                            self.bus.publish(Event::IntentAdmitted {
                                pair_id: intent.pair_id,
                                intent_id: intent.intent_id,
                                net_edge_cents: intent.net_edge_cents,
                            });
                            let engine = Arc::clone(&self.engine);
                            let tx = records_tx.clone();
                            tokio::spawn(async move {
                                let record = engine.execute(intent).await;
                                let _ = tx.send(record).await;
                            });
                        }
                        Err(reason) => {
                            increment_counter(CounterMetric::IntentsRejected);
                            self.bus.publish(Event::IntentRejected {
                                pair_id: pair.pair_id,
                                reason: reason.to_string(),
                            });
                        }
                    }
                }
                Err(skip) => self.on_skip(&pair.pair_id, skip),
            }
        }
    }

    fn on_skip(&self, pair_id: &PairId, skip: EdgeSkip) {
        match skip {
            EdgeSkip::Infeasible => {
                increment_counter(CounterMetric::IntentsRejected);
                self.bus.publish(Event::IntentRejected {
                    pair_id: *pair_id,
                    reason: skip.to_string(),
                });
            }
            EdgeSkip::StaleBook(venue) => {
                increment_counter(CounterMetric::StaleRejects);
                if self.health.note_stale(venue) {
                    self.bus.publish(Event::VenueDown(venue));
                }
                self.bus.publish(Event::IntentRejected {
                    pair_id: *pair_id,
                    reason: skip.to_string(),
                });
            }
            EdgeSkip::MissingBook(_) | EdgeSkip::MissingFeePack(_) => {
                tracing::debug!(pair = %pair_id, %skip, "Edge computation skipped");
            }
        }
    }

    fn on_health(&self, event: HealthEvent) {
        match event {
            HealthEvent::Down(venue) => {
                if self.health.set_down(venue, true) {
                    tracing::warn!(venue = %venue, "Venue down");
                    self.bus.publish(Event::VenueDown(venue));
                }
            }
            HealthEvent::Up(venue) => {
                if self.health.set_down(venue, false) {
                    tracing::info!(venue = %venue, "Venue recovered");
                    self.bus.publish(Event::VenueUp(venue));
                }
            }
        }
    }

    fn on_record(&self, record: &TradeRecord) {
        match record.outcome {
            Outcome::Committed => increment_counter(CounterMetric::TradesSettled),
            Outcome::Unwound => increment_counter(CounterMetric::TradesUnwound),
            Outcome::Failed => increment_counter(CounterMetric::TradesFailed),
        }
        self.risk.on_trade_record(record);
        if let Some(recorder) = &self.recorder {
            recorder.record_trade(record);
        }
    }

    fn snapshot_positions(&self) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let positions = self.engine.positions();
        let rows = positions
            .read()
            .expect("position book poisoned")
            .rows(Utc::now());
        if !rows.is_empty() {
            recorder.record_positions(rows);
        }
    }

    fn adapter_for(&self, venue: crate::registry::VenueId) -> Arc<dyn VenueAdapter> {
        if self.venue_a.venue() == venue {
            Arc::clone(&self.venue_a)
        } else {
            Arc::clone(&self.venue_b)
        }
    }
}
