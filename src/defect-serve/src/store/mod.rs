//! Append-only persistence for classification records.
//!
//! Stores keep whatever internal key they like in [`StoredRecord::store_id`];
//! callers strip it before handing records out.

use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::{Record, StoredRecord};

mod jsonl;
mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("cannot serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

pub trait RecordStore: Send + Sync {
    /// Persist `record` in full, or not at all.
    fn append(&self, record: &Record) -> Result<(), StoreError>;

    /// Up to `limit` records, newest timestamp first.
    fn query_recent(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError>;
}

/// Order items given in insertion order by timestamp descending, later
/// insertions first among equal timestamps, and keep the first `limit`.
pub(crate) fn newest_first<T, F>(mut items: Vec<T>, limit: usize, timestamp: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.reverse();
    items.sort_by(|a, b| timestamp(b).cmp(&timestamp(a)));
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(key: &str, ts: &str) -> StoredRecord {
        StoredRecord {
            store_id: key.into(),
            id: Some(key.into()),
            image_b64: String::new(),
            is_defective: false,
            confidence: 0.5,
            timestamp: ts.parse::<DateTime<Utc>>().unwrap(),
        }
    }

    fn by_time(records: Vec<StoredRecord>, limit: usize) -> Vec<StoredRecord> {
        newest_first(records, limit, |r| r.timestamp)
    }

    fn keys(records: &[StoredRecord]) -> Vec<&str> {
        records.iter().map(|r| r.store_id.as_str()).collect()
    }

    #[test]
    fn sorts_by_timestamp_descending() {
        let records = vec![
            stored("t2", "2024-01-01T00:00:02Z"),
            stored("t1", "2024-01-01T00:00:01Z"),
            stored("t3", "2024-01-01T00:00:03Z"),
        ];

        assert_eq!(keys(&by_time(records, 50)), ["t3", "t2", "t1"]);
    }

    #[test]
    fn ties_prefer_later_insertions() {
        let records = vec![
            stored("a", "2024-01-01T00:00:00Z"),
            stored("b", "2024-01-01T00:00:00Z"),
            stored("c", "2023-01-01T00:00:00Z"),
        ];

        assert_eq!(keys(&by_time(records, 50)), ["b", "a", "c"]);
    }

    #[test]
    fn truncates_to_limit() {
        let records = (0..10)
            .map(|i| stored(&i.to_string(), &format!("2024-01-01T00:00:{:02}Z", i)))
            .collect();

        assert_eq!(keys(&by_time(records, 3)), ["9", "8", "7"]);
    }
}
