//! Execution types

use crate::registry::PairId;
use crate::signal::{LegPlan, Package};
use crate::venue::Fill;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A risk-admitted instruction to execute one hedged package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionIntent {
    pub intent_id: Uuid,
    pub pair_id: PairId,
    pub package: Package,
    pub qty: u64,
    /// Legs in execution order: primary (leader venue) first
    pub legs: [LegPlan; 2],
    pub net_edge_cents: Decimal,
    pub fee_version_hash: String,
    pub created_at: DateTime<Utc>,
    /// Both legs must be fully hedged by this instant
    pub deadline: DateTime<Utc>,
}

/// Terminal condition of one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    /// Never sent
    Unplaced,
    /// Venue refused it
    Rejected,
    /// Acked but saw no fill
    Unfilled,
    /// Filled below the intended quantity
    PartiallyFilled,
    Filled,
    Cancelled,
}

/// How the hedge attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Both legs filled inside the budget
    Committed,
    /// Residual exposure was liquidated back to flat
    Unwound,
    Failed,
}

/// Why a hedge left the happy path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    PrimaryRejected,
    PrimaryTimeout,
    HedgeRejected,
    HedgeTimeout,
    AdverseMove,
    OperatorHalt,
    /// Unwind retries exhausted with residual exposure remaining
    LegRisk,
}

impl std::fmt::Display for TradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeReason::PrimaryRejected => "primary_rejected",
            TradeReason::PrimaryTimeout => "primary_timeout",
            TradeReason::HedgeRejected => "hedge_rejected",
            TradeReason::HedgeTimeout => "hedge_timeout",
            TradeReason::AdverseMove => "adverse_move",
            TradeReason::OperatorHalt => "operator_halt",
            TradeReason::LegRisk => "leg_risk",
        };
        write!(f, "{s}")
    }
}

/// Audit record published for every terminal hedge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub record_id: Uuid,
    pub pair_id: PairId,
    pub intent: ExecutionIntent,
    pub primary_status: LegStatus,
    pub hedge_status: LegStatus,
    /// All fills observed for this hedge, including unwind fills
    pub fills: Vec<Fill>,
    /// Edge actually captured per contract, in cents
    pub realized_edge_cents: Decimal,
    /// Realised cost of walking depth beyond top-of-book, in cents
    pub slippage_cents: Decimal,
    pub fee_version_hash: String,
    pub outcome: Outcome,
    pub reason: Option<TradeReason>,
    /// Unhedged contracts remaining at completion (0 unless Failed)
    pub residual_qty: u64,
    /// Fully offset contracts (YES matched with NO) across both legs
    pub matched_qty: u64,
    /// Wall-clock from admission to terminal state
    pub completed_in_ms: i64,
    pub completed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Total fees paid across all fills, in cents
    pub fn fees_paid_cents(&self) -> Decimal {
        self.fills.iter().map(|f| f.fee_paid_cents).sum()
    }
}
