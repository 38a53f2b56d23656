//! Async journal recorder
//!
//! Terminal trade records and periodic position snapshots flow through a
//! bounded channel into a buffering task. The trading loop only ever
//! `try_send`s: when the journal falls behind, entries are dropped and
//! counted, never awaited.

use super::parquet::{ParquetJournal, TradeRow};
use crate::exec::{PositionRow, TradeRecord};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub rotation_interval_secs: u64,
    /// Buffered trades before a flush
    pub buffer_size: usize,
    /// Maximum seconds between flushes
    pub flush_interval_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            rotation_interval_secs: 3_600,
            buffer_size: 64,
            flush_interval_secs: 10,
        }
    }
}

enum JournalEntry {
    Trade(Box<TradeRecord>),
    Positions(Vec<PositionRow>),
    Flush,
}

/// Handle used by the trading loop to append journal entries
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<JournalEntry>,
    drops: Arc<AtomicU64>,
}

impl RecorderHandle {
    /// Append a terminal trade record; drops (and counts) when backed up
    pub fn record_trade(&self, record: &TradeRecord) {
        if self
            .tx
            .try_send(JournalEntry::Trade(Box::new(record.clone())))
            .is_err()
        {
            self.drops.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(record = %record.record_id, "Journal backed up; trade record dropped");
        }
    }

    /// Append a position snapshot
    pub fn record_positions(&self, rows: Vec<PositionRow>) {
        if self.tx.try_send(JournalEntry::Positions(rows)).is_err() {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Force a flush of buffered rows (used by tests and shutdown paths)
    pub async fn flush(&self) {
        let _ = self.tx.send(JournalEntry::Flush).await;
    }

    /// Entries dropped because the journal was backed up
    pub fn dropped(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Spawn the journal task
pub fn spawn_recorder(config: RecorderConfig) -> (RecorderHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<JournalEntry>(256);
    let drops = Arc::new(AtomicU64::new(0));
    let handle = RecorderHandle {
        tx,
        drops: Arc::clone(&drops),
    };

    let task = tokio::spawn(async move {
        let mut journal = ParquetJournal::new(config.output_dir, config.rotation_interval_secs);
        let mut trades: Vec<TradeRow> = Vec::with_capacity(config.buffer_size);
        let mut flush_tick =
            tokio::time::interval(std::time::Duration::from_secs(config.flush_interval_secs.max(1)));
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let mut flush_now = false;
            tokio::select! {
                entry = rx.recv() => {
                    match entry {
                        Some(JournalEntry::Trade(record)) => {
                            trades.push(TradeRow::from(record.as_ref()));
                            if trades.len() >= config.buffer_size {
                                flush_now = true;
                            }
                        }
                        Some(JournalEntry::Positions(rows)) => {
                            let now = Utc::now();
                            let path = journal.next_path("positions", now);
                            if let Err(e) = journal.write_positions(&path, &rows) {
                                tracing::error!(error = %e, "Position snapshot write failed");
                            }
                        }
                        Some(JournalEntry::Flush) => flush_now = true,
                        None => {
                            flush_buffer(&mut journal, &mut trades);
                            break;
                        }
                    }
                }
                _ = flush_tick.tick() => flush_now = true,
            }

            if flush_now {
                flush_buffer(&mut journal, &mut trades);
            }
        }
    });

    (handle, task)
}

fn flush_buffer(journal: &mut ParquetJournal, trades: &mut Vec<TradeRow>) {
    if trades.is_empty() {
        return;
    }
    let now = Utc::now();
    if journal.needs_rotation(now) {
        journal.mark_rotation(now);
    }
    let path = journal.next_path("trades", now);
    if let Err(e) = journal.write_trades(&path, trades) {
        tracing::error!(error = %e, "Trade journal write failed");
    }
    trades.clear();
}
