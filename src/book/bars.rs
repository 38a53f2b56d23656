//! Mid-price bars for lead-lag analysis
//!
//! Each market's cache cell aggregates ticks into fixed-duration bars using a
//! time-weighted mid. Bars close on boundary crossings; gaps are forward
//! filled with the last observed mid so the two venues' series stay aligned.

use chrono::{DateTime, Duration, DurationRound, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// One closed bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub start: DateTime<Utc>,
    pub mid_cents: f64,
}

#[derive(Debug)]
struct OpenBar {
    start: DateTime<Utc>,
    last_ts: DateTime<Utc>,
    last_mid: f64,
    weighted_sum: f64,
    weighted_ms: f64,
}

/// Bounded ring of closed time-weighted mid bars
#[derive(Debug)]
pub struct BarSeries {
    duration: Duration,
    cap: usize,
    closed: VecDeque<Bar>,
    open: Option<OpenBar>,
}

impl BarSeries {
    pub fn new(duration_ms: u64, cap: usize) -> Self {
        Self {
            duration: Duration::milliseconds(duration_ms as i64),
            cap,
            closed: VecDeque::with_capacity(cap),
            open: None,
        }
    }

    fn bar_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts.duration_trunc(self.duration).unwrap_or(ts)
    }

    fn push_closed(&mut self, bar: Bar) {
        if self.closed.len() == self.cap {
            self.closed.pop_front();
        }
        self.closed.push_back(bar);
    }

    /// Fold a tick into the series; returns how many bars this tick closed
    pub fn update(&mut self, ts: DateTime<Utc>, mid_cents: Decimal) -> usize {
        let mid = mid_cents.to_f64().unwrap_or(f64::NAN);
        let start = self.bar_start(ts);

        let Some(open) = self.open.as_mut() else {
            self.open = Some(OpenBar {
                start,
                last_ts: ts,
                last_mid: mid,
                weighted_sum: 0.0,
                weighted_ms: 0.0,
            });
            return 0;
        };

        // Out-of-order ticks within the open bar just refresh the mid.
        if ts <= open.last_ts {
            open.last_mid = mid;
            return 0;
        }

        if start == open.start {
            let dt = (ts - open.last_ts).num_milliseconds() as f64;
            open.weighted_sum += open.last_mid * dt;
            open.weighted_ms += dt;
            open.last_ts = ts;
            open.last_mid = mid;
            return 0;
        }

        // Close the open bar, weighting the final mid out to the boundary.
        let bar_end = open.start + self.duration;
        let dt = (bar_end - open.last_ts).num_milliseconds() as f64;
        let sum = open.weighted_sum + open.last_mid * dt;
        let ms = open.weighted_ms + dt;
        let value = if ms > 0.0 { sum / ms } else { open.last_mid };
        let fill_mid = open.last_mid;
        let first = Bar {
            start: open.start,
            mid_cents: value,
        };
        let mut open_start = open.start;
        self.push_closed(first);
        let mut count = 1;

        // Forward-fill any wholly skipped bars.
        loop {
            open_start = open_start + self.duration;
            if open_start >= start {
                break;
            }
            self.push_closed(Bar {
                start: open_start,
                mid_cents: fill_mid,
            });
            count += 1;
        }

        self.open = Some(OpenBar {
            start,
            last_ts: ts,
            last_mid: mid,
            weighted_sum: 0.0,
            weighted_ms: 0.0,
        });
        count
    }

    /// Number of closed bars currently retained
    pub fn len(&self) -> usize {
        self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }

    /// Last `n` closed mids, oldest first
    pub fn tail(&self, n: usize) -> Vec<f64> {
        let skip = self.closed.len().saturating_sub(n);
        self.closed.iter().skip(skip).map(|b| b.mid_cents).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_single_bar_time_weighted() {
        let mut series = BarSeries::new(5_000, 10);
        let t = t0();

        // 50c for 2s, then 60c for the remaining 3s of the bar.
        assert_eq!(series.update(t, dec!(50)), 0);
        assert_eq!(series.update(t + Duration::seconds(2), dec!(60)), 0);
        assert_eq!(series.update(t + Duration::seconds(5), dec!(60)), 1);

        let bars = series.tail(10);
        assert_eq!(bars.len(), 1);
        // (50*2000 + 60*3000) / 5000 = 56
        assert!((bars[0] - 56.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_forward_fills() {
        let mut series = BarSeries::new(5_000, 10);
        let t = t0();

        series.update(t, dec!(50));
        // Next tick lands three bars later: closes one, fills two.
        let closed = series.update(t + Duration::seconds(16), dec!(70));
        assert_eq!(closed, 3);

        let bars = series.tail(10);
        assert_eq!(bars, vec![50.0, 50.0, 50.0]);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut series = BarSeries::new(5_000, 3);
        let mut t = t0();
        for i in 0..10u32 {
            series.update(t, dec!(40) + Decimal::from(i));
            t += Duration::seconds(5);
        }
        assert_eq!(series.len(), 3);
        let bars = series.tail(3);
        assert_eq!(bars, vec![46.0, 47.0, 48.0]);
    }

    #[test]
    fn test_out_of_order_tick_does_not_close() {
        let mut series = BarSeries::new(5_000, 10);
        let t = t0();
        series.update(t + Duration::seconds(2), dec!(50));
        assert_eq!(series.update(t + Duration::seconds(1), dec!(55)), 0);
        assert_eq!(series.len(), 0);
    }

    #[test]
    fn test_tail_shorter_than_requested() {
        let mut series = BarSeries::new(5_000, 10);
        let t = t0();
        series.update(t, dec!(50));
        series.update(t + Duration::seconds(5), dec!(52));
        assert_eq!(series.tail(10).len(), 1);
    }
}
