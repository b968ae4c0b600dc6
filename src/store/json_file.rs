//! JSON-file store.
//!
//! The whole table is one JSON document, and the file is the source of
//! truth: every operation re-reads it under the store lock, so records
//! written by another process are seen and kept.  Mutations are applied to
//! the freshly read table, written to a temporary sibling file and renamed
//! over the old one.  A failed write leaves the file as it was.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{RecordStore, RecordTable};
use crate::error::StoreError;
use crate::record::FetchedRecord;

pub struct JsonFileStore {
    path: PathBuf,
    /// Last table read from or written to disk.
    table: Mutex<RecordTable>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = load(&path)?;
        log::debug!("Opened record store {} ({} records)", path.display(), table.len());
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the cached table with the current file contents.
    fn refresh(&self, table: &mut RecordTable) -> Result<(), StoreError> {
        *table = load(&self.path)?;
        Ok(())
    }

    fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let json =
            serde_json::to_string_pretty(table).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| io_error(&tmp, source))?;
        fs::rename(&tmp, &self.path).map_err(|source| io_error(&self.path, source))
    }
}

/// Read and index the table at `path`; a missing file is an empty table.
fn load(path: &Path) -> Result<RecordTable, StoreError> {
    if !path.exists() {
        return Ok(RecordTable::default());
    }
    let text = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    let mut table: RecordTable = serde_json::from_str(&text).map_err(|e| corrupt(path, e))?;
    table.reindex().map_err(|reason| corrupt(path, reason))?;
    Ok(table)
}

fn corrupt(path: &Path, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl RecordStore for JsonFileStore {
    fn find_by_key(&self, key: &str) -> Result<Option<FetchedRecord>, StoreError> {
        let mut table = self.table.lock();
        self.refresh(&mut table)?;
        Ok(table.find_by_key(key).cloned())
    }

    fn upsert(
        &self,
        key: &str,
        payload: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Result<FetchedRecord, StoreError> {
        let mut table = self.table.lock();
        let mut next = load(&self.path)?;
        let record = next.upsert(key, payload, retrieved_at)?;
        self.persist(&next)?;
        *table = next;
        Ok(record)
    }

    fn latest(&self) -> Result<Option<FetchedRecord>, StoreError> {
        let mut table = self.table.lock();
        self.refresh(&mut table)?;
        Ok(table.latest().cloned())
    }

    fn list(&self) -> Result<Vec<FetchedRecord>, StoreError> {
        let mut table = self.table.lock();
        self.refresh(&mut table)?;
        Ok(table.list())
    }
}
