//! Per-market snapshot cells with single-writer discipline
//!
//! Each tracked market has one cell. The owning adapter's reader task is the
//! only writer; everyone else reads the latest snapshot through a cheap
//! pointer clone. Cells also feed the market's bar series for lead-lag.

use super::bars::BarSeries;
use super::BookSnapshot;
use crate::registry::VenueId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Sequence gap beyond which the market needs a resync
pub const MAX_SEQ_GAP: u64 = 100;

/// Outcome of applying a snapshot to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Stored as the new latest snapshot
    Stored { bars_closed: usize },
    /// Sequence number at or below the stored one; dropped
    StaleSeq,
    /// Best bid crossed best ask; dropped
    Crossed,
    /// Sequence jumped past the resync threshold; stored, caller should resync
    Gap { missed: u64 },
}

struct MarketCell {
    latest: RwLock<Option<Arc<BookSnapshot>>>,
    bars: Mutex<BarSeries>,
}

/// Cache of the most-recent snapshot per tracked market
pub struct BookCache {
    cells: RwLock<HashMap<(VenueId, String), Arc<MarketCell>>>,
    bar_duration_ms: u64,
    retention_bars: usize,
}

impl BookCache {
    pub fn new(bar_duration_ms: u64, retention_bars: usize) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            bar_duration_ms,
            retention_bars,
        }
    }

    fn cell(&self, venue: VenueId, market_id: &str) -> Option<Arc<MarketCell>> {
        self.cells
            .read()
            .expect("book cache poisoned")
            .get(&(venue, market_id.to_string()))
            .cloned()
    }

    fn cell_or_create(&self, venue: VenueId, market_id: &str) -> Arc<MarketCell> {
        if let Some(cell) = self.cell(venue, market_id) {
            return cell;
        }
        let mut guard = self.cells.write().expect("book cache poisoned");
        guard
            .entry((venue, market_id.to_string()))
            .or_insert_with(|| {
                Arc::new(MarketCell {
                    latest: RwLock::new(None),
                    bars: Mutex::new(BarSeries::new(self.bar_duration_ms, self.retention_bars)),
                })
            })
            .clone()
    }

    /// Pre-register a market cell ahead of its first snapshot
    pub fn track(&self, venue: VenueId, market_id: &str) {
        self.cell_or_create(venue, market_id);
    }

    /// Apply a snapshot. Only the market's adapter task may call this.
    pub fn apply(&self, snap: BookSnapshot) -> Applied {
        if snap.is_crossed() {
            tracing::warn!(
                venue = %snap.venue,
                market = %snap.market_id,
                seq = snap.seq,
                "Dropping crossed book snapshot"
            );
            return Applied::Crossed;
        }

        let cell = self.cell_or_create(snap.venue, &snap.market_id);
        let mut gap = 0;
        {
            let guard = cell.latest.read().expect("book cell poisoned");
            if let Some(prev) = guard.as_ref() {
                if snap.seq <= prev.seq {
                    return Applied::StaleSeq;
                }
                if snap.seq - prev.seq > MAX_SEQ_GAP {
                    gap = snap.seq - prev.seq - 1;
                }
            }
        }

        let bars_closed = match snap.mid_cents() {
            Some(mid) => {
                let mut bars = cell.bars.lock().expect("bar series poisoned");
                bars.update(snap.received_at, mid)
            }
            None => 0,
        };

        let mut guard = cell.latest.write().expect("book cell poisoned");
        *guard = Some(Arc::new(snap));

        if gap > 0 {
            Applied::Gap { missed: gap }
        } else {
            Applied::Stored { bars_closed }
        }
    }

    /// Latest snapshot for a market
    pub fn latest(&self, venue: VenueId, market_id: &str) -> Option<Arc<BookSnapshot>> {
        let cell = self.cell(venue, market_id)?;
        let guard = cell.latest.read().expect("book cell poisoned");
        guard.clone()
    }

    /// Whether the latest snapshot is within the freshness budget
    pub fn is_fresh(
        &self,
        venue: VenueId,
        market_id: &str,
        now: DateTime<Utc>,
        budget_ms: u64,
    ) -> bool {
        self.latest(venue, market_id)
            .map(|s| s.age_ms(now) <= budget_ms as i64)
            .unwrap_or(false)
    }

    /// Last `n` closed bar mids for a market, oldest first
    pub fn mid_series(&self, venue: VenueId, market_id: &str, n: usize) -> Vec<f64> {
        match self.cell(venue, market_id) {
            Some(cell) => cell.bars.lock().expect("bar series poisoned").tail(n),
            None => Vec::new(),
        }
    }

    /// Number of closed bars available for a market
    pub fn closed_bars(&self, venue: VenueId, market_id: &str) -> usize {
        match self.cell(venue, market_id) {
            Some(cell) => cell.bars.lock().expect("bar series poisoned").len(),
            None => 0,
        }
    }
}
