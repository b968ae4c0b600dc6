//! Keyed record storage.
//!
//! This module defines the [`RecordStore`] trait and [`RecordTable`], the
//! in-memory table both backends share.  Backends differ only in where the
//! table lives between processes:
//!
//! * [`MemoryStore`]: nothing survives the process (tests, `--ephemeral`).
//! * [`JsonFileStore`]: the table is a JSON file, rewritten atomically on
//!   every mutation.
//!
//! ## For contributors: adding a backend
//!
//! Wrap a [`RecordTable`] (or your own index) and implement [`RecordStore`].
//! `upsert` must never create a second record for a key that is already
//! stored, and must leave the store untouched when it returns an error.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::{newest_first, FetchedRecord, RecordId};

/// Persistence for fetched records, keyed by natural key.
///
/// Shared between the scheduler thread and manual triggers, so every method
/// takes `&self` and implementations serialise access internally.
pub trait RecordStore: Send + Sync {
    /// Exact-match lookup.
    fn find_by_key(&self, key: &str) -> Result<Option<FetchedRecord>, StoreError>;

    /// Update the record stored under `key`, or insert a new one.
    fn upsert(
        &self,
        key: &str,
        payload: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Result<FetchedRecord, StoreError>;

    /// The record with the greatest `retrieved_at`, if any.
    fn latest(&self) -> Result<Option<FetchedRecord>, StoreError>;

    /// Every record, newest first.
    fn list(&self) -> Result<Vec<FetchedRecord>, StoreError>;
}

/// Records plus a key index.  Serialized as-is by [`JsonFileStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordTable {
    next_id: u64,
    records: Vec<FetchedRecord>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl RecordTable {
    /// Rebuild the key index after deserializing.  When several records share
    /// a key, the first one is the one that gets found and updated.  Fails
    /// when the stored ids leave no room for another record.
    fn reindex(&mut self) -> Result<(), String> {
        let max_id = self.records.iter().map(|r| r.id.0).max().unwrap_or(0);
        if max_id == u64::MAX || self.next_id == u64::MAX {
            return Err(format!("record ids are exhausted (highest id {max_id})"));
        }

        self.index.clear();
        for (pos, record) in self.records.iter().enumerate() {
            self.index.entry(record.key.clone()).or_insert(pos);
        }
        self.next_id = self.next_id.max(max_id + 1);
        Ok(())
    }

    fn find_by_key(&self, key: &str) -> Option<&FetchedRecord> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    fn upsert(
        &mut self,
        key: &str,
        payload: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Result<FetchedRecord, StoreError> {
        if let Some(&pos) = self.index.get(key) {
            let record = &mut self.records[pos];
            record.payload = payload.to_string();
            // Never move a key's timestamp backwards, even if the wall clock did.
            record.retrieved_at = record.retrieved_at.max(retrieved_at);
            return Ok(record.clone());
        }

        let id = RecordId(self.next_id.max(1));
        self.next_id = id.0.checked_add(1).ok_or(StoreError::IdsExhausted)?;
        let record = FetchedRecord {
            id,
            key: key.to_string(),
            payload: payload.to_string(),
            retrieved_at,
        };
        self.index.insert(record.key.clone(), self.records.len());
        self.records.push(record.clone());
        Ok(record)
    }

    fn latest(&self) -> Option<&FetchedRecord> {
        self.records.iter().min_by(|a, b| newest_first(a, b))
    }

    fn list(&self) -> Vec<FetchedRecord> {
        let mut records = self.records.clone();
        records.sort_by(newest_first);
        records
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
