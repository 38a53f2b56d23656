//! Configuration types for pk-arb

use crate::registry::{FeePack, Frictions, RoundingRule, VenueId};
use crate::risk::{RiskParams, StopLimits};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub venues: VenuesConfig,
    pub pairs: PairsConfig,
    pub fees: FeesConfig,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub data: DataConfig,
    pub telemetry: TelemetryConfig,
}

/// Venue endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenuesConfig {
    pub polymarket_ws_url: String,
    pub kalshi_ws_url: String,
}

impl Default for VenuesConfig {
    fn default() -> Self {
        Self {
            polymarket_ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            kalshi_ws_url: "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string(),
        }
    }
}

/// Pair catalogue settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PairsConfig {
    /// Matcher similarity acceptance score, applied at pair ingestion
    pub accept_score: Decimal,
    /// Optional pair catalogue file
    pub file: Option<PathBuf>,
}

impl Default for PairsConfig {
    fn default() -> Self {
        Self {
            accept_score: dec!(0.92),
            file: None,
        }
    }
}

/// Per-venue fee parameters (venue tag added when building the pack)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FeeParams {
    pub taker_bps: Decimal,
    pub taker_fixed_cents: Decimal,
    pub maker_bps: Decimal,
    pub profit_fee_bps: Decimal,
    pub rounding: RoundingRule,
    pub frictions: Frictions,
}

impl FeeParams {
    pub fn to_pack(&self, venue: VenueId) -> FeePack {
        FeePack {
            venue,
            taker_bps: self.taker_bps,
            taker_fixed_cents: self.taker_fixed_cents,
            maker_bps: self.maker_bps,
            profit_fee_bps: self.profit_fee_bps,
            rounding: self.rounding,
            frictions: self.frictions,
        }
    }
}

/// Fee parameters per venue
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FeesConfig {
    pub polymarket: FeeParams,
    pub kalshi: FeeParams,
}

/// Signal engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Contracts per package used for depth walks and intents
    pub intended_qty: u64,
    pub freshness_budget_ms: u64,
    pub bar_duration_ms: u64,
    pub xcorr_window_bars: usize,
    pub xcorr_max_lag_bars: usize,
    pub min_correlation: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            intended_qty: 100,
            freshness_budget_ms: 2_000,
            bar_duration_ms: 5_000,
            xcorr_window_bars: 120,
            xcorr_max_lag_bars: 6,
            min_correlation: 0.3,
        }
    }
}

/// Risk controller configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub min_net_edge_cents: Decimal,
    pub pairs_max: usize,
    pub venue_cap_usd: Decimal,
    pub per_contract_exposure_usd: Decimal,
    pub min_hedge_probability: f64,
    pub initial_equity_usd: Decimal,
    pub stops_daily_pct: Decimal,
    pub stops_weekly_pct: Decimal,
    pub stops_monthly_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_net_edge_cents: dec!(2.5),
            pairs_max: 8,
            venue_cap_usd: dec!(5000),
            per_contract_exposure_usd: dec!(250),
            min_hedge_probability: 0.99,
            initial_equity_usd: dec!(10000),
            stops_daily_pct: dec!(1),
            stops_weekly_pct: dec!(3),
            stops_monthly_pct: dec!(5),
        }
    }
}

/// Execution mode: paper trading against sim venues or live
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub hedge_timeout_ms: u64,
    pub unwind_budget_ms: u64,
    pub backoff_max_ms: u64,
    pub unwind_max_retries: u32,
    pub adverse_move_cents: Decimal,
    pub adverse_move_duration_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            hedge_timeout_ms: 250,
            unwind_budget_ms: 800,
            backoff_max_ms: 800,
            unwind_max_retries: 3,
            adverse_move_cents: dec!(1.5),
            adverse_move_duration_ms: 5_000,
        }
    }
}

/// Trade journal configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub capture_enabled: bool,
    pub output_dir: PathBuf,
    pub rotation_interval_secs: u64,
    pub buffer_size: usize,
    pub flush_interval_secs: u64,
    pub position_snapshot_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            output_dir: PathBuf::from("./data"),
            rotation_interval_secs: 3_600,
            buffer_size: 64,
            flush_interval_secs: 10,
            position_snapshot_secs: 30,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub metrics_port: u16,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Flatten the risk-relevant sections into admission parameters
    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            min_net_edge_cents: self.risk.min_net_edge_cents,
            freshness_budget_ms: self.signal.freshness_budget_ms,
            pairs_max: self.risk.pairs_max,
            venue_cap_usd: self.risk.venue_cap_usd,
            per_contract_exposure_usd: self.risk.per_contract_exposure_usd,
            min_hedge_probability: self.risk.min_hedge_probability,
            hedge_timeout_ms: self.execution.hedge_timeout_ms,
            initial_equity_usd: self.risk.initial_equity_usd,
            stops: StopLimits {
                daily_pct: self.risk.stops_daily_pct,
                weekly_pct: self.risk.stops_weekly_pct,
                monthly_pct: self.risk.stops_monthly_pct,
            },
        }
    }

    /// Flatten the execution section into engine parameters
    pub fn exec_params(&self) -> crate::exec::ExecParams {
        crate::exec::ExecParams {
            hedge_timeout_ms: self.execution.hedge_timeout_ms,
            unwind_budget_ms: self.execution.unwind_budget_ms,
            unwind_max_retries: self.execution.unwind_max_retries,
            backoff_max_ms: self.execution.backoff_max_ms,
            adverse_move_cents: self.execution.adverse_move_cents,
            adverse_move_duration_ms: self.execution.adverse_move_duration_ms,
        }
    }
}
