//! Append-only journal of committed transactions.
//!
//! Each line is a JSON-serialized [`JournalRecord`] holding the sequence
//! number and the mutation batch of one committed transaction. The journal
//! supports replay for crash recovery and handles corrupt lines gracefully.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use oc_core::types::{
    AssetId, Holding, IdempotencyRecord, Investor, InvestorId, Order, OrderStateLog, Trade,
};
use oc_core::types::market::Asset;

use crate::error::StoreError;

/// One staged mutation inside a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalOp {
    PutOrder(Order),
    PutTrade(Trade),
    PutHolding(Holding),
    DeleteHolding {
        investor_id: InvestorId,
        asset_id: AssetId,
    },
    AppendLog(OrderStateLog),
    PutIdempotency(IdempotencyRecord),
    PutInvestor(Investor),
    PutAsset(Asset),
}

/// The mutation batch of one committed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Monotonic commit sequence number.
    pub seq: u64,
    /// Mutations applied atomically by this commit.
    pub ops: Vec<JournalOp>,
}

/// Append-only journal file.
///
/// Writes are flushed on every append so a committed transaction survives a
/// process crash.
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Journal {
    /// Create or open a journal file at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StoreError::Fatal(format!("failed to open journal at {}: {e}", path.display()))
            })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Append a committed record as a single JSON line and flush.
    pub fn append(&mut self, record: &JournalRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Fatal(format!("failed to serialize journal record: {e}")))?;
        writeln!(self.writer, "{}", json)
            .map_err(|e| StoreError::Fatal(format!("failed to write journal: {e}")))?;
        self.writer
            .flush()
            .map_err(|e| StoreError::Fatal(format!("failed to flush journal: {e}")))?;
        Ok(())
    }

    /// Replay all records from a journal file, in commit order.
    ///
    /// Corrupt lines are skipped with a warning log; a missing file replays
    /// as empty.
    pub fn replay(path: &Path) -> Result<Vec<JournalRecord>, StoreError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Fatal(format!(
                    "failed to open journal for replay: {e}"
                )))
            }
        };
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line
                .map_err(|e| StoreError::Fatal(format!("failed to read journal line: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "skipping corrupt journal line"
                    );
                }
            }
        }

        Ok(records)
    }

    /// The path this journal writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oc_core::types::{OrderId, OrderStatus, Side};
    use rust_decimal_macros::dec;
    use std::io::Write as IoWrite;

    fn make_order() -> Order {
        Order {
            id: OrderId::generate(),
            investor_id: InvestorId(1),
            asset_id: AssetId(10),
            side: Side::Buy,
            quantity: dec!(2),
            price: None,
            status: OrderStatus::New,
            idempotency_key: None,
            ordered_at: Utc::now(),
            executed_at: None,
            settled_at: None,
        }
    }

    fn make_record(seq: u64) -> JournalRecord {
        JournalRecord {
            seq,
            ops: vec![JournalOp::PutOrder(make_order())],
        }
    }

    #[test]
    fn test_write_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&make_record(1)).unwrap();
            journal.append(&make_record(2)).unwrap();
        }

        let records = Journal::replay(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        let records = Journal::replay(&path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_corrupt_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&make_record(1)).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{this is not valid json}}").unwrap();
        }
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&make_record(2)).unwrap();
        }

        let records = Journal::replay(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn test_journal_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&make_record(1)).unwrap();
        }
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&make_record(2)).unwrap();
        }

        let records = Journal::replay(&path).unwrap();
        assert_eq!(records.len(), 2);
    }
}
