//! Venue health and operator control surface
//!
//! Per-venue down/halted flags with single-writer semantics: adapters drive
//! the down flag, the operator drives the halted flag. Every reader sees the
//! flags through cheap atomic loads on the hot path.

use crate::events::{Event, EventBus};
use crate::registry::{PairId, Registry, VenueId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Consecutive stale-feed rejections that flag a venue down
pub const STALE_STRIKES: u32 = 3;

#[derive(Default)]
struct VenueFlags {
    down: AtomicBool,
    halted: AtomicBool,
    stale_strikes: AtomicU32,
}

/// Live health flags for both venues
pub struct HealthRegistry {
    venues: HashMap<VenueId, VenueFlags>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        let mut venues = HashMap::new();
        venues.insert(VenueId::Polymarket, VenueFlags::default());
        venues.insert(VenueId::Kalshi, VenueFlags::default());
        Self { venues }
    }

    fn flags(&self, venue: VenueId) -> &VenueFlags {
        self.venues.get(&venue).expect("venue registered")
    }

    pub fn is_down(&self, venue: VenueId) -> bool {
        self.flags(venue).down.load(Ordering::Acquire)
    }

    pub fn is_halted(&self, venue: VenueId) -> bool {
        self.flags(venue).halted.load(Ordering::Acquire)
    }

    /// Whether the venue can accept new admissions
    pub fn is_tradeable(&self, venue: VenueId) -> bool {
        !self.is_down(venue) && !self.is_halted(venue)
    }

    /// Set the down flag; returns true when the value changed
    pub fn set_down(&self, venue: VenueId, down: bool) -> bool {
        let changed = self.flags(venue).down.swap(down, Ordering::AcqRel) != down;
        if changed && !down {
            self.flags(venue).stale_strikes.store(0, Ordering::Release);
        }
        changed
    }

    /// Set the halted flag; returns true when the value changed
    pub fn set_halted(&self, venue: VenueId, halted: bool) -> bool {
        self.flags(venue).halted.swap(halted, Ordering::AcqRel) != halted
    }

    /// Record a stale-feed rejection; returns true when the strike budget is
    /// exhausted and the venue was newly flagged down
    pub fn note_stale(&self, venue: VenueId) -> bool {
        let strikes = self.flags(venue).stale_strikes.fetch_add(1, Ordering::AcqRel) + 1;
        if strikes >= STALE_STRIKES {
            return self.set_down(venue, true);
        }
        false
    }

    /// Clear the stale-strike counter after a fresh admission
    pub fn clear_stale(&self, venue: VenueId) {
        self.flags(venue).stale_strikes.store(0, Ordering::Release);
    }
}

/// Operator command surface
#[derive(Clone)]
pub struct Operator {
    health: Arc<HealthRegistry>,
    registry: Arc<Registry>,
    bus: EventBus,
}

impl Operator {
    pub fn new(health: Arc<HealthRegistry>, registry: Arc<Registry>, bus: EventBus) -> Self {
        Self {
            health,
            registry,
            bus,
        }
    }

    /// Refuse new admissions for a venue. Live hedges touching it unwind.
    pub fn halt(&self, venue: VenueId, who: &str) {
        self.health.set_halted(venue, true);
        tracing::warn!(venue = %venue, who, "Venue halted");
        self.bus.publish(Event::HaltRequested {
            venue,
            who: who.to_string(),
        });
    }

    /// Clear a halt; refused while the venue is down
    pub fn resume(&self, venue: VenueId, who: &str) -> bool {
        if self.health.is_down(venue) {
            tracing::warn!(venue = %venue, who, "Resume refused: venue is down");
            return false;
        }
        self.health.set_halted(venue, false);
        tracing::info!(venue = %venue, who, "Venue resumed");
        self.bus.publish(Event::ResumeRequested {
            venue,
            who: who.to_string(),
        });
        true
    }

    /// Stop admitting a pair. In-flight hedges on it finish or unwind on
    /// their own; deactivation never tears them down.
    pub fn deactivate_pair(&self, pair_id: PairId) -> bool {
        self.registry.set_pair_active(pair_id, false)
    }
}
