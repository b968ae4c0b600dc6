//! Process-local store.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{RecordStore, RecordTable};
use crate::error::StoreError;
use crate::record::FetchedRecord;

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<RecordTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn find_by_key(&self, key: &str) -> Result<Option<FetchedRecord>, StoreError> {
        Ok(self.table.lock().find_by_key(key).cloned())
    }

    fn upsert(
        &self,
        key: &str,
        payload: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Result<FetchedRecord, StoreError> {
        self.table.lock().upsert(key, payload, retrieved_at)
    }

    fn latest(&self) -> Result<Option<FetchedRecord>, StoreError> {
        Ok(self.table.lock().latest().cloned())
    }

    fn list(&self) -> Result<Vec<FetchedRecord>, StoreError> {
        Ok(self.table.lock().list())
    }
}
