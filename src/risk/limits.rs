//! Rolling PnL stops
//!
//! Tracks equity against daily, weekly, and monthly anchors. A window whose
//! loss exceeds its configured stop blocks all new admissions until the
//! window rolls over.

use super::types::StopWindow;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Loss limits as percentages of window-start equity
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StopLimits {
    pub daily_pct: Decimal,
    pub weekly_pct: Decimal,
    pub monthly_pct: Decimal,
}

impl Default for StopLimits {
    fn default() -> Self {
        Self {
            daily_pct: dec!(1),
            weekly_pct: dec!(3),
            monthly_pct: dec!(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    /// (year, ordinal) style period key
    key: (i32, u32),
    equity: Decimal,
}

/// Equity tracker with per-window anchors
#[derive(Debug)]
pub struct PnlMonitor {
    equity_usd: Decimal,
    daily: Anchor,
    weekly: Anchor,
    monthly: Anchor,
}

fn day_key(now: DateTime<Utc>) -> (i32, u32) {
    (now.year(), now.ordinal())
}

fn week_key(now: DateTime<Utc>) -> (i32, u32) {
    let week = now.iso_week();
    (week.year(), week.week())
}

fn month_key(now: DateTime<Utc>) -> (i32, u32) {
    (now.year(), now.month())
}

impl PnlMonitor {
    pub fn new(initial_equity_usd: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            equity_usd: initial_equity_usd,
            daily: Anchor {
                key: day_key(now),
                equity: initial_equity_usd,
            },
            weekly: Anchor {
                key: week_key(now),
                equity: initial_equity_usd,
            },
            monthly: Anchor {
                key: month_key(now),
                equity: initial_equity_usd,
            },
        }
    }

    pub fn equity_usd(&self) -> Decimal {
        self.equity_usd
    }

    /// Roll anchors whose window boundary has passed
    pub fn roll(&mut self, now: DateTime<Utc>) {
        if self.daily.key != day_key(now) {
            self.daily = Anchor {
                key: day_key(now),
                equity: self.equity_usd,
            };
        }
        if self.weekly.key != week_key(now) {
            self.weekly = Anchor {
                key: week_key(now),
                equity: self.equity_usd,
            };
        }
        if self.monthly.key != month_key(now) {
            self.monthly = Anchor {
                key: month_key(now),
                equity: self.equity_usd,
            };
        }
    }

    /// Apply a realised result in cents
    pub fn record_realized_cents(&mut self, cents: Decimal, now: DateTime<Utc>) {
        self.roll(now);
        self.equity_usd += cents / dec!(100);
    }

    fn window_loss_pct(anchor: &Anchor, equity: Decimal) -> Decimal {
        if anchor.equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (anchor.equity - equity) / anchor.equity * dec!(100)
    }

    /// First breached stop window, if any
    pub fn breached(&mut self, limits: &StopLimits, now: DateTime<Utc>) -> Option<StopWindow> {
        self.roll(now);
        if Self::window_loss_pct(&self.daily, self.equity_usd) > limits.daily_pct {
            return Some(StopWindow::Daily);
        }
        if Self::window_loss_pct(&self.weekly, self.equity_usd) > limits.weekly_pct {
            return Some(StopWindow::Weekly);
        }
        if Self::window_loss_pct(&self.monthly, self.equity_usd) > limits.monthly_pct {
            return Some(StopWindow::Monthly);
        }
        None
    }
}
