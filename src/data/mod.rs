//! Trade journal
//!
//! Append-only Parquet journal for terminal trade records plus periodic
//! position snapshots. Everything downstream of the bounded channel is
//! best-effort; the trading loop never waits on disk.

pub mod parquet;
mod recorder;

pub use parquet::{JournalReader, ParquetJournal, TradeRow};
pub use recorder::{spawn_recorder, RecorderConfig, RecorderHandle};
