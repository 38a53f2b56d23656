//! Risk and admission control
//!
//! Every edge quote passes through the hard predicates here before it can
//! become an execution intent. The path is purely computational: it reads
//! in-memory snapshots and never suspends.

mod admission;
mod limits;
mod types;

pub use admission::{AdmissionController, RiskParams};
pub use limits::{PnlMonitor, StopLimits};
pub use types::{RejectReason, StopWindow};

use crate::registry::{PairId, VenueId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Live hedge slots: at most one per pair, bounded globally
pub struct LiveHedges {
    inner: Mutex<HashSet<PairId>>,
    max: usize,
}

impl LiveHedges {
    pub fn new(max: usize) -> Self {
        Self {
            inner: Mutex::new(HashSet::new()),
            max,
        }
    }

    /// Atomically claim a slot for a pair
    pub fn try_reserve(&self, pair_id: PairId) -> Result<(), RejectReason> {
        let mut guard = self.inner.lock().expect("live hedges poisoned");
        if guard.contains(&pair_id) {
            return Err(RejectReason::PairBusy);
        }
        if guard.len() >= self.max {
            return Err(RejectReason::TooManyLiveHedges(self.max));
        }
        guard.insert(pair_id);
        Ok(())
    }

    /// Release a pair's slot once its hedge reaches a terminal state
    pub fn release(&self, pair_id: PairId) {
        self.inner.lock().expect("live hedges poisoned").remove(&pair_id);
    }

    pub fn count(&self) -> usize {
        self.inner.lock().expect("live hedges poisoned").len()
    }

    pub fn is_live(&self, pair_id: PairId) -> bool {
        self.inner
            .lock()
            .expect("live hedges poisoned")
            .contains(&pair_id)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// Observed hedge completions per venue, for the completion-probability gate
pub struct HedgeStats {
    inner: Mutex<HashMap<VenueId, VecDeque<bool>>>,
    window: usize,
    min_samples: usize,
}

impl HedgeStats {
    pub fn new(window: usize, min_samples: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            window,
            min_samples,
        }
    }

    /// Record whether a hedge leg on this venue completed in time
    pub fn record(&self, venue: VenueId, success: bool) {
        let mut guard = self.inner.lock().expect("hedge stats poisoned");
        let history = guard.entry(venue).or_default();
        if history.len() == self.window {
            history.pop_front();
        }
        history.push_back(success);
    }

    /// Estimated completion probability. Optimistic until `min_samples`
    /// observations exist, so a cold start does not block all trading.
    pub fn probability(&self, venue: VenueId) -> f64 {
        let guard = self.inner.lock().expect("hedge stats poisoned");
        match guard.get(&venue) {
            Some(history) if history.len() >= self.min_samples => {
                let hits = history.iter().filter(|s| **s).count();
                hits as f64 / history.len() as f64
            }
            _ => 1.0,
        }
    }
}

impl Default for HedgeStats {
    fn default() -> Self {
        Self::new(100, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_live_hedges_one_per_pair() {
        let live = LiveHedges::new(8);
        let pair_id = Uuid::new_v4();

        live.try_reserve(pair_id).unwrap();
        assert_eq!(live.try_reserve(pair_id), Err(RejectReason::PairBusy));

        live.release(pair_id);
        live.try_reserve(pair_id).unwrap();
    }

    #[test]
    fn test_live_hedges_global_cap() {
        let live = LiveHedges::new(2);
        live.try_reserve(Uuid::new_v4()).unwrap();
        live.try_reserve(Uuid::new_v4()).unwrap();
        assert_eq!(
            live.try_reserve(Uuid::new_v4()),
            Err(RejectReason::TooManyLiveHedges(2))
        );
        assert_eq!(live.count(), 2);
    }

    #[test]
    fn test_hedge_stats_optimistic_when_cold() {
        let stats = HedgeStats::new(100, 20);
        assert_eq!(stats.probability(VenueId::Kalshi), 1.0);

        for _ in 0..5 {
            stats.record(VenueId::Kalshi, false);
        }
        // Still below min_samples.
        assert_eq!(stats.probability(VenueId::Kalshi), 1.0);
    }

    #[test]
    fn test_hedge_stats_tracks_failures() {
        let stats = HedgeStats::new(100, 20);
        for i in 0..20 {
            stats.record(VenueId::Kalshi, i % 2 == 0);
        }
        assert!((stats.probability(VenueId::Kalshi) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hedge_stats_window_bounded() {
        let stats = HedgeStats::new(10, 5);
        for _ in 0..10 {
            stats.record(VenueId::Polymarket, false);
        }
        for _ in 0..10 {
            stats.record(VenueId::Polymarket, true);
        }
        // Old failures fell out of the window.
        assert_eq!(stats.probability(VenueId::Polymarket), 1.0);
    }
}
