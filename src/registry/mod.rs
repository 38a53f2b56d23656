//! Market registry and pair store
//!
//! Holds the catalogue of matched cross-venue pairs and the versioned fee
//! packs. Pairs are produced by the external matcher; this module validates
//! them at ingestion and serves consistent copy-on-write snapshots to the
//! signal and risk paths.

mod fees;

pub use fees::{FeePack, Frictions, RoundingRule};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Venue identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Polymarket,
    Kalshi,
}

impl VenueId {
    /// The opposite venue
    pub fn other(self) -> Self {
        match self {
            VenueId::Polymarket => VenueId::Kalshi,
            VenueId::Kalshi => VenueId::Polymarket,
        }
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueId::Polymarket => write!(f, "polymarket"),
            VenueId::Kalshi => write!(f, "kalshi"),
        }
    }
}

/// Which slot of a pair a market occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairSide {
    A,
    B,
}

impl PairSide {
    pub fn other(self) -> Self {
        match self {
            PairSide::A => PairSide::B,
            PairSide::B => PairSide::A,
        }
    }
}

/// Pair identifier
pub type PairId = Uuid;

/// A tradeable binary market on one venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Venue the market trades on
    pub venue: VenueId,
    /// Venue-specific market identifier (ticker or token id)
    pub market_id: String,
    /// Canonicalised symbol
    pub symbol: String,
    /// When the market closes/settles
    pub close_time: DateTime<Utc>,
    /// Where the outcome is resolved from
    pub resolution_source: String,
    /// Whether the market is a binary YES/NO contract
    pub binary: bool,
    /// Minimum price increment in cents
    pub tick_cents: Decimal,
    /// Contract lot size
    pub lot_size: u64,
}

/// Two markets on different venues proven equivalent by the matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    #[serde(default = "Uuid::new_v4")]
    pub pair_id: PairId,
    pub market_a: Market,
    pub market_b: Market,
    /// Matcher similarity score in [0, 1]
    pub similarity_score: Decimal,
    /// Whether all hard-rule predicates passed at match time
    pub rules_passed: bool,
    /// Whether the pair is eligible for new admissions
    pub active: bool,
}

impl Pair {
    /// The market occupying the given slot
    pub fn market(&self, side: PairSide) -> &Market {
        match side {
            PairSide::A => &self.market_a,
            PairSide::B => &self.market_b,
        }
    }

    /// Which slot of this pair the given market occupies, if any
    pub fn side_of(&self, venue: VenueId, market_id: &str) -> Option<PairSide> {
        if self.market_a.venue == venue && self.market_a.market_id == market_id {
            Some(PairSide::A)
        } else if self.market_b.venue == venue && self.market_b.market_id == market_id {
            Some(PairSide::B)
        } else {
            None
        }
    }
}

/// Why a pair was refused at ingestion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairRejection {
    #[error("market {0} is not binary")]
    NotBinary(String),
    #[error("market {0} is already closed")]
    Closed(String),
    #[error("both markets are on {0}")]
    SameVenue(VenueId),
    #[error("similarity {score} below acceptance {min}")]
    SimilarityBelowThreshold { score: Decimal, min: Decimal },
    #[error("hard-rule checks failed")]
    RulesFailed,
}

/// Pair catalogue file format
#[derive(Debug, Deserialize)]
pub struct PairFile {
    pub pairs: Vec<Pair>,
}

impl PairFile {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Pair and fee-pack store with copy-on-write reader snapshots
pub struct Registry {
    pairs: RwLock<Arc<HashMap<PairId, Arc<Pair>>>>,
    fees: RwLock<HashMap<VenueId, Arc<FeePack>>>,
    accept_score: Decimal,
}

impl Registry {
    /// Create an empty registry with the given similarity acceptance score
    pub fn new(accept_score: Decimal) -> Self {
        Self {
            pairs: RwLock::new(Arc::new(HashMap::new())),
            fees: RwLock::new(HashMap::new()),
            accept_score,
        }
    }

    /// Validate and store a matcher-produced pair
    pub fn ingest_pair(&self, pair: Pair) -> Result<PairId, PairRejection> {
        self.ingest_pair_at(pair, Utc::now())
    }

    /// Validate and store a pair against an explicit clock (for testing)
    pub fn ingest_pair_at(&self, pair: Pair, now: DateTime<Utc>) -> Result<PairId, PairRejection> {
        for market in [&pair.market_a, &pair.market_b] {
            if !market.binary {
                return Err(PairRejection::NotBinary(market.market_id.clone()));
            }
            if market.close_time <= now {
                return Err(PairRejection::Closed(market.market_id.clone()));
            }
        }
        if pair.market_a.venue == pair.market_b.venue {
            return Err(PairRejection::SameVenue(pair.market_a.venue));
        }
        if pair.similarity_score < self.accept_score {
            return Err(PairRejection::SimilarityBelowThreshold {
                score: pair.similarity_score,
                min: self.accept_score,
            });
        }
        if !pair.rules_passed {
            return Err(PairRejection::RulesFailed);
        }

        let pair_id = pair.pair_id;
        let mut guard = self.pairs.write().expect("pair store poisoned");
        let mut next = (**guard).clone();
        next.insert(pair_id, Arc::new(pair));
        *guard = Arc::new(next);
        Ok(pair_id)
    }

    /// Flip a pair's active flag; returns false for unknown pairs
    pub fn set_pair_active(&self, pair_id: PairId, active: bool) -> bool {
        let mut guard = self.pairs.write().expect("pair store poisoned");
        let Some(existing) = guard.get(&pair_id) else {
            return false;
        };
        let mut pair = (**existing).clone();
        pair.active = active;
        let mut next = (**guard).clone();
        next.insert(pair_id, Arc::new(pair));
        *guard = Arc::new(next);
        true
    }

    /// Look up a pair by id
    pub fn pair(&self, pair_id: PairId) -> Option<Arc<Pair>> {
        self.pairs
            .read()
            .expect("pair store poisoned")
            .get(&pair_id)
            .cloned()
    }

    /// All pairs currently eligible for admission
    pub fn active_pairs(&self) -> Vec<Arc<Pair>> {
        self.pairs
            .read()
            .expect("pair store poisoned")
            .values()
            .filter(|p| p.active)
            .cloned()
            .collect()
    }

    /// Active pairs that include the given market (triggers for recompute)
    pub fn pairs_for_market(&self, venue: VenueId, market_id: &str) -> Vec<Arc<Pair>> {
        self.pairs
            .read()
            .expect("pair store poisoned")
            .values()
            .filter(|p| p.active && p.side_of(venue, market_id).is_some())
            .cloned()
            .collect()
    }

    /// Publish a new fee-pack version for a venue
    pub fn publish_fee_pack(&self, pack: FeePack) {
        let mut guard = self.fees.write().expect("fee store poisoned");
        guard.insert(pack.venue, Arc::new(pack));
    }

    /// Current fee pack for a venue, if one has been published
    pub fn fee_pack(&self, venue: VenueId) -> Option<Arc<FeePack>> {
        self.fees
            .read()
            .expect("fee store poisoned")
            .get(&venue)
            .cloned()
    }
}
