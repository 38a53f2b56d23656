//! Trading loop metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Book snapshot apply
    BookApply,
    /// Edge computation per pair
    EdgeCompute,
    /// Risk admission decision
    Admission,
    /// Taker order placement round-trip
    LegPlacement,
    /// Admission to fully hedged
    HedgeCompletion,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Concurrent live hedges
    LiveHedges,
    /// Active pair count
    ActivePairs,
    /// Events dropped by slow subscribers
    EventsDropped,
    /// Journal entries dropped under back-pressure
    JournalDropped,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    EdgesComputed,
    IntentsAdmitted,
    IntentsRejected,
    TradesSettled,
    TradesUnwound,
    TradesFailed,
    StaleRejects,
    WsReconnects,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::BookApply => "pkarb_book_apply_latency_ms",
        LatencyMetric::EdgeCompute => "pkarb_edge_compute_latency_ms",
        LatencyMetric::Admission => "pkarb_admission_latency_ms",
        LatencyMetric::LegPlacement => "pkarb_leg_placement_latency_ms",
        LatencyMetric::HedgeCompletion => "pkarb_hedge_completion_latency_ms",
    };

    // TODO: wire into the Prometheus exporter once the scrape endpoint lands
    tracing::debug!(
        metric = metric_name,
        value_ms = duration.as_millis(),
        "Recording latency"
    );
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::Equity => "pkarb_equity_usd",
        GaugeMetric::LiveHedges => "pkarb_live_hedges",
        GaugeMetric::ActivePairs => "pkarb_active_pairs",
        GaugeMetric::EventsDropped => "pkarb_events_dropped_total",
        GaugeMetric::JournalDropped => "pkarb_journal_dropped_total",
    };

    tracing::debug!(metric = metric_name, value = value, "Setting gauge");
}

/// Increment a counter
pub fn increment_counter(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::EdgesComputed => "pkarb_edges_computed_total",
        CounterMetric::IntentsAdmitted => "pkarb_intents_admitted_total",
        CounterMetric::IntentsRejected => "pkarb_intents_rejected_total",
        CounterMetric::TradesSettled => "pkarb_trades_settled_total",
        CounterMetric::TradesUnwound => "pkarb_trades_unwound_total",
        CounterMetric::TradesFailed => "pkarb_trades_failed_total",
        CounterMetric::StaleRejects => "pkarb_stale_rejects_total",
        CounterMetric::WsReconnects => "pkarb_ws_reconnects_total",
    };

    tracing::debug!(metric = metric_name, "Incrementing counter");
}

/// Start the metrics endpoint
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    tracing::info!(port, "Metrics endpoint configured");
    Ok(())
}
