//! Parquet journal files with rotation

use crate::exec::{PositionRow, TradeRecord};
use arrow::array::{
    Array, ArrayRef, Int64Array, StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

/// Flattened trade record for the journal
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub ts: DateTime<Utc>,
    pub record_id: String,
    pub pair_id: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub package: String,
    pub qty: u64,
    pub matched_qty: u64,
    pub residual_qty: u64,
    /// Stored as string to keep Decimal precision
    pub realized_edge_cents: Decimal,
    pub slippage_cents: Decimal,
    pub fee_version_hash: String,
    pub primary_venue: String,
    pub hedge_venue: String,
    pub completed_in_ms: i64,
}

impl From<&TradeRecord> for TradeRow {
    fn from(record: &TradeRecord) -> Self {
        Self {
            ts: record.completed_at,
            record_id: record.record_id.to_string(),
            pair_id: record.pair_id.to_string(),
            outcome: format!("{:?}", record.outcome).to_lowercase(),
            reason: record.reason.map(|r| r.to_string()),
            package: record.intent.package.to_string(),
            qty: record.intent.qty,
            matched_qty: record.matched_qty,
            residual_qty: record.residual_qty,
            realized_edge_cents: record.realized_edge_cents,
            slippage_cents: record.slippage_cents,
            fee_version_hash: record.fee_version_hash.clone(),
            primary_venue: record.intent.legs[0].venue.to_string(),
            hedge_venue: record.intent.legs[1].venue.to_string(),
            completed_in_ms: record.completed_in_ms,
        }
    }
}

fn utc_ts_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Trade journal schema
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        utc_ts_field("ts"),
        Field::new("record_id", DataType::Utf8, false),
        Field::new("pair_id", DataType::Utf8, false),
        Field::new("outcome", DataType::Utf8, false),
        Field::new("reason", DataType::Utf8, true),
        Field::new("package", DataType::Utf8, false),
        Field::new("qty", DataType::UInt64, false),
        Field::new("matched_qty", DataType::UInt64, false),
        Field::new("residual_qty", DataType::UInt64, false),
        Field::new("realized_edge_cents", DataType::Utf8, false),
        Field::new("slippage_cents", DataType::Utf8, false),
        Field::new("fee_version_hash", DataType::Utf8, false),
        Field::new("primary_venue", DataType::Utf8, false),
        Field::new("hedge_venue", DataType::Utf8, false),
        Field::new("completed_in_ms", DataType::Int64, false),
    ])
}

/// Position snapshot schema
pub fn position_schema() -> Schema {
    Schema::new(vec![
        utc_ts_field("ts"),
        Field::new("venue", DataType::Utf8, false),
        Field::new("market_id", DataType::Utf8, false),
        Field::new("qty_yes", DataType::Int64, false),
        Field::new("qty_no", DataType::Int64, false),
        Field::new("avg_px_yes_cents", DataType::Utf8, false),
        Field::new("avg_px_no_cents", DataType::Utf8, false),
    ])
}

/// Parquet file writer with time-based rotation
pub struct ParquetJournal {
    output_dir: PathBuf,
    rotation_interval: Duration,
    current_file_start: Option<DateTime<Utc>>,
    file_counter: u64,
}

impl ParquetJournal {
    pub fn new(output_dir: PathBuf, rotation_interval_secs: u64) -> Self {
        Self {
            output_dir,
            rotation_interval: Duration::seconds(rotation_interval_secs as i64),
            current_file_start: None,
            file_counter: 0,
        }
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        match self.current_file_start {
            None => true,
            Some(start) => now - start >= self.rotation_interval,
        }
    }

    pub fn mark_rotation(&mut self, now: DateTime<Utc>) {
        self.current_file_start = Some(now);
    }

    /// Unique path for the next journal file
    pub fn next_path(&mut self, prefix: &str, now: DateTime<Utc>) -> PathBuf {
        self.file_counter += 1;
        let filename = format!(
            "{}_{}_{:04}.parquet",
            prefix,
            now.format("%Y%m%d_%H%M%S"),
            self.file_counter
        );
        self.output_dir.join(filename)
    }

    fn writer_props() -> WriterProperties {
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build()
    }

    /// Write trade rows to a Parquet file
    pub fn write_trades(&self, path: &PathBuf, rows: &[TradeRow]) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_dir()?;

        let schema = Arc::new(trade_schema());
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(Self::writer_props()))?;

        let ts: Vec<i64> = rows.iter().map(|r| r.ts.timestamp_micros()).collect();
        let record_ids: Vec<&str> = rows.iter().map(|r| r.record_id.as_str()).collect();
        let pair_ids: Vec<&str> = rows.iter().map(|r| r.pair_id.as_str()).collect();
        let outcomes: Vec<&str> = rows.iter().map(|r| r.outcome.as_str()).collect();
        let reasons: Vec<Option<&str>> = rows.iter().map(|r| r.reason.as_deref()).collect();
        let packages: Vec<&str> = rows.iter().map(|r| r.package.as_str()).collect();
        let qtys: Vec<u64> = rows.iter().map(|r| r.qty).collect();
        let matched: Vec<u64> = rows.iter().map(|r| r.matched_qty).collect();
        let residual: Vec<u64> = rows.iter().map(|r| r.residual_qty).collect();
        let realized: Vec<String> = rows
            .iter()
            .map(|r| r.realized_edge_cents.to_string())
            .collect();
        let slippage: Vec<String> = rows.iter().map(|r| r.slippage_cents.to_string()).collect();
        let hashes: Vec<&str> = rows.iter().map(|r| r.fee_version_hash.as_str()).collect();
        let primary: Vec<&str> = rows.iter().map(|r| r.primary_venue.as_str()).collect();
        let hedge: Vec<&str> = rows.iter().map(|r| r.hedge_venue.as_str()).collect();
        let elapsed: Vec<i64> = rows.iter().map(|r| r.completed_in_ms).collect();

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampMicrosecondArray::from(ts).with_timezone("UTC")) as ArrayRef,
                Arc::new(StringArray::from(record_ids)) as ArrayRef,
                Arc::new(StringArray::from(pair_ids)) as ArrayRef,
                Arc::new(StringArray::from(outcomes)) as ArrayRef,
                Arc::new(StringArray::from(reasons)) as ArrayRef,
                Arc::new(StringArray::from(packages)) as ArrayRef,
                Arc::new(UInt64Array::from(qtys)) as ArrayRef,
                Arc::new(UInt64Array::from(matched)) as ArrayRef,
                Arc::new(UInt64Array::from(residual)) as ArrayRef,
                Arc::new(StringArray::from(
                    realized.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
                Arc::new(StringArray::from(
                    slippage.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
                Arc::new(StringArray::from(hashes)) as ArrayRef,
                Arc::new(StringArray::from(primary)) as ArrayRef,
                Arc::new(StringArray::from(hedge)) as ArrayRef,
                Arc::new(Int64Array::from(elapsed)) as ArrayRef,
            ],
        )?;

        writer.write(&batch)?;
        writer.close()?;

        tracing::debug!(path = ?path, count = rows.len(), "Wrote trade journal batch");
        Ok(())
    }

    /// Write position snapshot rows to a Parquet file
    pub fn write_positions(&self, path: &PathBuf, rows: &[PositionRow]) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_dir()?;

        let schema = Arc::new(position_schema());
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(Self::writer_props()))?;

        let ts: Vec<i64> = rows.iter().map(|r| r.ts.timestamp_micros()).collect();
        let venues: Vec<String> = rows.iter().map(|r| r.venue.to_string()).collect();
        let markets: Vec<&str> = rows.iter().map(|r| r.market_id.as_str()).collect();
        let qty_yes: Vec<i64> = rows.iter().map(|r| r.qty_yes).collect();
        let qty_no: Vec<i64> = rows.iter().map(|r| r.qty_no).collect();
        let avg_yes: Vec<String> = rows.iter().map(|r| r.avg_px_yes_cents.to_string()).collect();
        let avg_no: Vec<String> = rows.iter().map(|r| r.avg_px_no_cents.to_string()).collect();

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampMicrosecondArray::from(ts).with_timezone("UTC")) as ArrayRef,
                Arc::new(StringArray::from(
                    venues.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
                Arc::new(StringArray::from(markets)) as ArrayRef,
                Arc::new(Int64Array::from(qty_yes)) as ArrayRef,
                Arc::new(Int64Array::from(qty_no)) as ArrayRef,
                Arc::new(StringArray::from(
                    avg_yes.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
                Arc::new(StringArray::from(
                    avg_no.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
            ],
        )?;

        writer.write(&batch)?;
        writer.close()?;

        tracing::debug!(path = ?path, count = rows.len(), "Wrote position snapshot");
        Ok(())
    }
}

/// Reader for trade journal files
pub struct JournalReader {
    path: PathBuf,
}

impl JournalReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read trade rows back from a journal file
    pub fn read_trades(&self) -> anyhow::Result<Vec<TradeRow>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::str::FromStr;

        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut rows = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;

            let str_col = |i: usize| -> anyhow::Result<&StringArray> {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow::anyhow!("column {i} is not utf8"))
            };
            let u64_col = |i: usize| -> anyhow::Result<&UInt64Array> {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<UInt64Array>()
                    .ok_or_else(|| anyhow::anyhow!("column {i} is not u64"))
            };

            let ts = batch
                .column(0)
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(|| anyhow::anyhow!("invalid ts column"))?;
            let elapsed = batch
                .column(14)
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| anyhow::anyhow!("invalid completed_in_ms column"))?;

            for i in 0..batch.num_rows() {
                rows.push(TradeRow {
                    ts: DateTime::from_timestamp_micros(ts.value(i))
                        .ok_or_else(|| anyhow::anyhow!("invalid ts"))?,
                    record_id: str_col(1)?.value(i).to_string(),
                    pair_id: str_col(2)?.value(i).to_string(),
                    outcome: str_col(3)?.value(i).to_string(),
                    reason: if str_col(4)?.is_null(i) {
                        None
                    } else {
                        Some(str_col(4)?.value(i).to_string())
                    },
                    package: str_col(5)?.value(i).to_string(),
                    qty: u64_col(6)?.value(i),
                    matched_qty: u64_col(7)?.value(i),
                    residual_qty: u64_col(8)?.value(i),
                    realized_edge_cents: Decimal::from_str(str_col(9)?.value(i))?,
                    slippage_cents: Decimal::from_str(str_col(10)?.value(i))?,
                    fee_version_hash: str_col(11)?.value(i).to_string(),
                    primary_venue: str_col(12)?.value(i).to_string(),
                    hedge_venue: str_col(13)?.value(i).to_string(),
                    completed_in_ms: elapsed.value(i),
                });
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn row(outcome: &str) -> TradeRow {
        TradeRow {
            ts: Utc::now(),
            record_id: "r1".to_string(),
            pair_id: "p1".to_string(),
            outcome: outcome.to_string(),
            reason: Some("hedge_timeout".to_string()),
            package: "a_yes_b_no".to_string(),
            qty: 50,
            matched_qty: 50,
            residual_qty: 0,
            realized_edge_cents: dec!(2.0),
            slippage_cents: dec!(0.5),
            fee_version_hash: "abc:def".to_string(),
            primary_venue: "polymarket".to_string(),
            hedge_venue: "kalshi".to_string(),
            completed_in_ms: 180,
        }
    }

    #[test]
    fn test_trade_schema_shape() {
        let schema = trade_schema();
        assert_eq!(schema.fields().len(), 15);
        assert_eq!(schema.field(0).name(), "ts");
        assert!(schema.field(4).is_nullable());
    }

    #[test]
    fn test_rotation() {
        let mut journal = ParquetJournal::new(PathBuf::from("/data"), 3600);
        let now = Utc::now();

        assert!(journal.needs_rotation(now));
        journal.mark_rotation(now);
        assert!(!journal.needs_rotation(now));
        assert!(journal.needs_rotation(now + Duration::hours(2)));
    }

    #[test]
    fn test_next_path_unique() {
        let mut journal = ParquetJournal::new(PathBuf::from("/data"), 3600);
        let now = Utc::now();
        let a = journal.next_path("trades", now);
        let b = journal.next_path("trades", now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_write_and_read_trades() {
        let dir = TempDir::new().unwrap();
        let mut journal = ParquetJournal::new(dir.path().to_path_buf(), 3600);

        let rows = vec![row("committed"), row("unwound")];
        let path = journal.next_path("trades", Utc::now());
        journal.write_trades(&path, &rows).unwrap();

        let read = JournalReader::new(path).read_trades().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].outcome, "committed");
        assert_eq!(read[0].realized_edge_cents, dec!(2.0));
        assert_eq!(read[1].outcome, "unwound");
        assert_eq!(read[1].reason.as_deref(), Some("hedge_timeout"));
    }

    #[test]
    fn test_write_empty_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut journal = ParquetJournal::new(dir.path().to_path_buf(), 3600);
        let path = journal.next_path("trades", Utc::now());
        journal.write_trades(&path, &[]).unwrap();
        assert!(!path.exists());
    }
}
