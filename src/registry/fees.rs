//! Versioned fee packs and friction parameters
//!
//! A `FeePack` bundles every per-venue cost used in edge math. Packs are
//! immutable once published; changing any parameter publishes a new pack
//! with a new version hash, and the hash is stamped onto every edge quote
//! computed from it.

use super::VenueId;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Per-fill fee rounding behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Round half away from zero (default)
    HalfUp,
    /// Truncate toward zero
    Down,
}

impl Default for RoundingRule {
    fn default() -> Self {
        RoundingRule::HalfUp
    }
}

/// Costs beyond exchange fees, charged per leg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frictions {
    /// Chain gas cost per leg, in cents
    pub gas_cents: Decimal,
    /// Bridge cost per leg, in cents
    pub bridge_cents: Decimal,
    /// On-ramp fee in basis points of leg notional
    pub onramp_bps: Decimal,
    /// FX conversion spread in basis points of leg notional
    pub fx_spread_bps: Decimal,
}

impl Default for Frictions {
    fn default() -> Self {
        Self {
            gas_cents: Decimal::ZERO,
            bridge_cents: Decimal::ZERO,
            onramp_bps: Decimal::ZERO,
            fx_spread_bps: Decimal::ZERO,
        }
    }
}

/// Immutable per-venue fee parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeePack {
    pub venue: VenueId,
    /// Taker fee in basis points of leg notional
    #[serde(default)]
    pub taker_bps: Decimal,
    /// Flat taker fee per contract, in cents
    #[serde(default)]
    pub taker_fixed_cents: Decimal,
    /// Maker fee in basis points (unused by the taker-only engine, kept for
    /// parity with venue fee schedules)
    #[serde(default)]
    pub maker_bps: Decimal,
    /// Fee on net winnings in basis points
    #[serde(default)]
    pub profit_fee_bps: Decimal,
    #[serde(default)]
    pub rounding: RoundingRule,
    #[serde(default)]
    pub frictions: Frictions,
}

impl FeePack {
    /// A zero-cost pack, useful as a starting point
    pub fn free(venue: VenueId) -> Self {
        Self {
            venue,
            taker_bps: Decimal::ZERO,
            taker_fixed_cents: Decimal::ZERO,
            maker_bps: Decimal::ZERO,
            profit_fee_bps: Decimal::ZERO,
            rounding: RoundingRule::HalfUp,
            frictions: Frictions::default(),
        }
    }

    /// Deterministic content hash identifying this pack version
    pub fn version_hash(&self) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.venue.hash(&mut hasher);
        self.taker_bps.hash(&mut hasher);
        self.taker_fixed_cents.hash(&mut hasher);
        self.maker_bps.hash(&mut hasher);
        self.profit_fee_bps.hash(&mut hasher);
        (self.rounding == RoundingRule::HalfUp).hash(&mut hasher);
        self.frictions.gas_cents.hash(&mut hasher);
        self.frictions.bridge_cents.hash(&mut hasher);
        self.frictions.onramp_bps.hash(&mut hasher);
        self.frictions.fx_spread_bps.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Round a cent amount per this pack's rounding rule (2 decimal places)
    pub fn round_cents(&self, cents: Decimal) -> Decimal {
        match self.rounding {
            RoundingRule::HalfUp => {
                cents.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            }
            RoundingRule::Down => cents.round_dp_with_strategy(2, RoundingStrategy::ToZero),
        }
    }

    /// Taker fee per contract, in cents, for a fill at `px_cents`
    pub fn taker_fee_cents(&self, px_cents: Decimal) -> Decimal {
        let bps_part = px_cents * self.taker_bps / dec!(10000);
        self.round_cents(bps_part + self.taker_fixed_cents)
    }

    /// Fee on winnings per contract, in cents; zero when the edge is not positive
    pub fn profit_fee_cents(&self, gross_edge_cents: Decimal) -> Decimal {
        if gross_edge_cents <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.round_cents(gross_edge_cents * self.profit_fee_bps / dec!(10000))
    }

    /// Friction cost per contract, in cents, for one leg of `qty` contracts
    /// at `px_cents`. Fixed costs are amortised across the leg quantity.
    pub fn friction_cents(&self, px_cents: Decimal, qty: u64) -> Decimal {
        if qty == 0 {
            return Decimal::ZERO;
        }
        let fixed = (self.frictions.gas_cents + self.frictions.bridge_cents) / Decimal::from(qty);
        let bps = px_cents * (self.frictions.onramp_bps + self.frictions.fx_spread_bps)
            / dec!(10000);
        self.round_cents(fixed + bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack() -> FeePack {
        FeePack {
            venue: VenueId::Kalshi,
            taker_bps: dec!(100),
            taker_fixed_cents: dec!(0),
            maker_bps: dec!(0),
            profit_fee_bps: dec!(200),
            rounding: RoundingRule::HalfUp,
            frictions: Frictions {
                gas_cents: dec!(2),
                bridge_cents: dec!(0),
                onramp_bps: dec!(50),
                fx_spread_bps: dec!(10),
            },
        }
    }

    #[test]
    fn test_taker_fee_bps() {
        // 100 bps of 50c = 0.50c
        assert_eq!(pack().taker_fee_cents(dec!(50)), dec!(0.50));
    }

    #[test]
    fn test_taker_fee_fixed() {
        let mut p = pack();
        p.taker_bps = dec!(0);
        p.taker_fixed_cents = dec!(0.5);
        assert_eq!(p.taker_fee_cents(dec!(48)), dec!(0.5));
        assert_eq!(p.taker_fee_cents(dec!(99)), dec!(0.5));
    }

    #[test]
    fn test_profit_fee_only_on_positive_edge() {
        let p = pack();
        // 200 bps of 3c = 0.06c
        assert_eq!(p.profit_fee_cents(dec!(3)), dec!(0.06));
        assert_eq!(p.profit_fee_cents(dec!(-1)), Decimal::ZERO);
        assert_eq!(p.profit_fee_cents(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_friction_amortises_fixed_costs() {
        let p = pack();
        // gas 2c over 100 contracts = 0.02c, plus 60 bps of 50c = 0.30c
        assert_eq!(p.friction_cents(dec!(50), 100), dec!(0.32));
        assert_eq!(p.friction_cents(dec!(50), 0), Decimal::ZERO);
    }

    #[test]
    fn test_rounding_rules() {
        let mut p = pack();
        p.taker_bps = dec!(125);
        // 125 bps of 42c = 0.525c -> 0.53 half-up, 0.52 down
        assert_eq!(p.taker_fee_cents(dec!(42)), dec!(0.53));
        p.rounding = RoundingRule::Down;
        assert_eq!(p.taker_fee_cents(dec!(42)), dec!(0.52));
    }

    #[test]
    fn test_version_hash_changes_with_content() {
        let a = pack();
        let mut b = pack();
        assert_eq!(a.version_hash(), b.version_hash());

        b.taker_bps = dec!(101);
        assert_ne!(a.version_hash(), b.version_hash());
    }

    #[test]
    fn test_version_hash_deterministic() {
        let p = pack();
        assert_eq!(p.version_hash(), p.version_hash());
    }
}
