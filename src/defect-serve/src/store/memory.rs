use std::sync::RwLock;

use uuid::Uuid;

use super::{newest_first, RecordStore, StoreError};
use crate::record::{Record, StoredRecord};

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row as-is, bypassing record assembly.
    pub fn insert_raw(&self, record: StoredRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn append(&self, record: &Record) -> Result<(), StoreError> {
        let stored = StoredRecord::new(Uuid::new_v4().simple().to_string(), record);
        self.insert_raw(stored)
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .clone();

        Ok(newest_first(records, limit, |r| r.timestamp))
    }
}
