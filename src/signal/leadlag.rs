//! Lead-lag routing hints from rolling cross-correlation
//!
//! On each closed bar the worker recomputes the cross-correlation of the two
//! mid-price series over the configured window, across lags up to the
//! configured maximum. A venue only becomes the leader once it has won 3 of
//! the last 4 evaluations; the hint orders leg execution and nothing else.

use crate::book::BookCache;
use crate::registry::{PairId, PairSide, Registry};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Minimum series length before a correlation is attempted
const MIN_BARS: usize = 10;

/// Stability window: leader must win 3 of the last 4 evaluations
const STABILITY_WINDOW: usize = 4;
const STABILITY_REQUIRED: usize = 3;

/// Current routing hint for a pair
#[derive(Debug, Clone, Copy)]
pub struct LeaderHint {
    /// Stable leader, if any
    pub leader: Option<PairSide>,
    pub confidence: f64,
    /// Detected lag in bars (positive: A leads)
    pub lag_bars: i64,
    pub correlation: f64,
}

impl Default for LeaderHint {
    fn default() -> Self {
        Self {
            leader: None,
            confidence: 0.0,
            lag_bars: 0,
            correlation: 0.0,
        }
    }
}

/// Pearson correlation of two equal-length slices
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len();
    if n < 2 || n != b.len() {
        return None;
    }
    let nf = n as f64;
    let mean_a = a.iter().sum::<f64>() / nf;
    let mean_b = b.iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Best positive correlation across lags in [-max_lag, +max_lag].
///
/// A positive lag means series `a` leads `b` by that many bars: `a`'s early
/// values line up with `b`'s later ones.
pub fn cross_correlation(a: &[f64], b: &[f64], max_lag: usize) -> Option<(i64, f64)> {
    let n = a.len().min(b.len());
    if n < MIN_BARS {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];

    let mut best: Option<(i64, f64)> = None;
    let max_lag = max_lag.min(n - 2) as i64;
    for lag in -max_lag..=max_lag {
        let shift = lag.unsigned_abs() as usize;
        let corr = if lag > 0 {
            pearson(&a[..n - shift], &b[shift..])
        } else if lag < 0 {
            pearson(&a[shift..], &b[..n - shift])
        } else {
            pearson(a, b)
        };
        if let Some(c) = corr {
            if c > 0.0 && best.map_or(true, |(_, bc)| c > bc) {
                best = Some((lag, c));
            }
        }
    }
    best
}

/// Folds raw correlation results into stable per-pair hints
pub struct LeadLagAnalyzer {
    window_bars: usize,
    max_lag_bars: usize,
    min_correlation: f64,
    history: HashMap<PairId, VecDeque<Option<PairSide>>>,
}

impl LeadLagAnalyzer {
    pub fn new(window_bars: usize, max_lag_bars: usize, min_correlation: f64) -> Self {
        Self {
            window_bars,
            max_lag_bars,
            min_correlation,
            history: HashMap::new(),
        }
    }

    pub fn window_bars(&self) -> usize {
        self.window_bars
    }

    pub fn max_lag_bars(&self) -> usize {
        self.max_lag_bars
    }

    /// Evaluate one window for a pair
    pub fn evaluate(&mut self, pair_id: PairId, a: &[f64], b: &[f64]) -> LeaderHint {
        let raw = cross_correlation(a, b, self.max_lag_bars);
        self.fold(pair_id, raw)
    }

    /// Fold a precomputed correlation result into the stability filter
    pub fn fold(&mut self, pair_id: PairId, raw: Option<(i64, f64)>) -> LeaderHint {
        let (lag, corr) = raw.unwrap_or((0, 0.0));

        let candidate = if corr >= self.min_correlation {
            match lag.cmp(&0) {
                std::cmp::Ordering::Greater => Some(PairSide::A),
                std::cmp::Ordering::Less => Some(PairSide::B),
                std::cmp::Ordering::Equal => None,
            }
        } else {
            None
        };

        let history = self.history.entry(pair_id).or_default();
        if history.len() == STABILITY_WINDOW {
            history.pop_front();
        }
        history.push_back(candidate);

        let stable = match candidate {
            Some(side) => {
                history.iter().filter(|h| **h == Some(side)).count() >= STABILITY_REQUIRED
            }
            None => false,
        };

        let leader = if stable { candidate } else { None };
        let confidence = if stable { corr } else { corr * 0.5 };

        tracing::debug!(
            pair = %pair_id,
            ?leader,
            lag_bars = lag,
            correlation = corr,
            stable,
            "Lead-lag window evaluated"
        );

        LeaderHint {
            leader,
            confidence,
            lag_bars: lag,
            correlation: corr,
        }
    }
}

/// Shared view of the latest hint per pair
#[derive(Default)]
pub struct LeaderBoard {
    inner: RwLock<HashMap<PairId, LeaderHint>>,
}

impl LeaderBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair_id: PairId) -> LeaderHint {
        self.inner
            .read()
            .expect("leader board poisoned")
            .get(&pair_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&self, pair_id: PairId, hint: LeaderHint) {
        self.inner
            .write()
            .expect("leader board poisoned")
            .insert(pair_id, hint);
    }
}

/// Spawn the dedicated lead-lag worker.
///
/// The trading loop sends pair ids whose bars closed; the correlation runs on
/// the blocking pool so it never stalls the signal path.
pub fn spawn_leadlag_worker(
    books: Arc<BookCache>,
    registry: Arc<Registry>,
    board: Arc<LeaderBoard>,
    mut rx: mpsc::Receiver<PairId>,
    mut analyzer: LeadLagAnalyzer,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(pair_id) = rx.recv().await {
            let Some(pair) = registry.pair(pair_id) else {
                continue;
            };
            let window = analyzer.window_bars();
            let a = books.mid_series(
                pair.market_a.venue,
                &pair.market_a.market_id,
                window,
            );
            let b = books.mid_series(
                pair.market_b.venue,
                &pair.market_b.market_id,
                window,
            );
            if a.len() < MIN_BARS || b.len() < MIN_BARS {
                continue;
            }

            let max_lag = analyzer.max_lag_bars();
            let raw = tokio::task::spawn_blocking(move || cross_correlation(&a, &b, max_lag))
                .await
                .unwrap_or(None);

            let hint = analyzer.fold(pair_id, raw);
            board.set(pair_id, hint);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// A wandering series with enough variance to correlate on
    fn base_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 50.0 + 6.0 * ((i as f64) * 0.7).sin() + 2.0 * ((i as f64) * 0.23).cos())
            .collect()
    }

    /// `b` trails `a` by `lag` bars
    fn lagged(a: &[f64], lag: usize) -> Vec<f64> {
        let mut b = vec![a[0]; lag];
        b.extend_from_slice(&a[..a.len() - lag]);
        b
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_flat_series() {
        let a = [1.0, 1.0, 1.0, 1.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!(pearson(&a, &b).is_none());
    }

    #[test]
    fn test_cross_correlation_detects_a_leading() {
        let a = base_series(60);
        let b = lagged(&a, 2);
        let (lag, corr) = cross_correlation(&a, &b, 6).unwrap();
        assert_eq!(lag, 2);
        assert!(corr > 0.95);
    }

    #[test]
    fn test_cross_correlation_detects_b_leading() {
        let b = base_series(60);
        let a = lagged(&b, 3);
        let (lag, corr) = cross_correlation(&a, &b, 6).unwrap();
        assert_eq!(lag, -3);
        assert!(corr > 0.95);
    }

    #[test]
    fn test_cross_correlation_needs_enough_bars() {
        let a = base_series(5);
        assert!(cross_correlation(&a, &a, 6).is_none());
    }

    #[test]
    fn test_leader_requires_stability() {
        let mut analyzer = LeadLagAnalyzer::new(120, 6, 0.3);
        let pair_id = Uuid::new_v4();
        let a = base_series(60);
        let b = lagged(&a, 2);

        // First two wins are not yet stable.
        assert_eq!(analyzer.evaluate(pair_id, &a, &b).leader, None);
        assert_eq!(analyzer.evaluate(pair_id, &a, &b).leader, None);
        // Third consecutive win crosses 3-of-4.
        let hint = analyzer.evaluate(pair_id, &a, &b);
        assert_eq!(hint.leader, Some(PairSide::A));
        assert!(hint.confidence > 0.9);
    }

    #[test]
    fn test_leader_flips_back_to_none_on_disagreement() {
        let mut analyzer = LeadLagAnalyzer::new(120, 6, 0.3);
        let pair_id = Uuid::new_v4();
        let a = base_series(60);
        let b = lagged(&a, 2);

        for _ in 0..4 {
            analyzer.evaluate(pair_id, &a, &b);
        }
        assert_eq!(analyzer.evaluate(pair_id, &a, &b).leader, Some(PairSide::A));

        // Two windows with B leading break A's 3-of-4 majority without yet
        // establishing B's.
        analyzer.evaluate(pair_id, &b, &a);
        let hint = analyzer.evaluate(pair_id, &b, &a);
        assert_eq!(hint.leader, None);
    }

    #[test]
    fn test_weak_correlation_gives_no_leader() {
        let mut analyzer = LeadLagAnalyzer::new(120, 6, 0.99);
        let pair_id = Uuid::new_v4();
        let a = base_series(60);
        let noisy: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, v)| v + if i % 2 == 0 { 4.0 } else { -4.0 })
            .collect();

        for _ in 0..4 {
            let hint = analyzer.evaluate(pair_id, &a, &noisy);
            assert_eq!(hint.leader, None);
        }
    }

    #[test]
    fn test_leader_board_defaults() {
        let board = LeaderBoard::new();
        let hint = board.get(Uuid::new_v4());
        assert_eq!(hint.leader, None);
        assert_eq!(hint.confidence, 0.0);
    }
}
