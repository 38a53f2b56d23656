//! Risk types

use crate::registry::VenueId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Drawdown stop window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopWindow {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for StopWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopWindow::Daily => write!(f, "daily"),
            StopWindow::Weekly => write!(f, "weekly"),
            StopWindow::Monthly => write!(f, "monthly"),
        }
    }
}

/// Named reason an edge quote was refused admission
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("net edge {net} below minimum {min}")]
    EdgeBelowMinimum { net: Decimal, min: Decimal },
    #[error("stale feed on {0}")]
    StaleFeed(VenueId),
    #[error("venue {0} is down")]
    VenueDown(VenueId),
    #[error("venue {0} is halted")]
    VenueHalted(VenueId),
    #[error("pair already has a live hedge")]
    PairBusy,
    #[error("live hedges at cap {0}")]
    TooManyLiveHedges(usize),
    #[error("venue {venue} notional {would_usd} would exceed cap {cap_usd}")]
    VenueCapExceeded {
        venue: VenueId,
        would_usd: Decimal,
        cap_usd: Decimal,
    },
    #[error("contract {market_id} notional {would_usd} would exceed cap {cap_usd}")]
    ContractCapExceeded {
        market_id: String,
        would_usd: Decimal,
        cap_usd: Decimal,
    },
    #[error("{0} drawdown stop active")]
    DrawdownStop(StopWindow),
    #[error("hedge completion probability {est} below minimum {min}")]
    HedgeProbabilityTooLow { est: f64, min: f64 },
    #[error("no fee pack published for {0}")]
    MissingFeePack(VenueId),
    #[error("pair is inactive")]
    PairInactive,
    #[error("edge decomposition does not sum to net")]
    EdgeInconsistent,
}
