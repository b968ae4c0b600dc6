//! The stored record type shared by the store, pipeline and views.
//!
//! A `FetchedRecord` is one logical snapshot of the upstream document,
//! identified by its natural key.  The serialized field names (`title`,
//! `body`, `date_retrieved`) describe the persisted layout: the key is the
//! entry's title, the canonical payload its body, and the retrieval time a
//! side-attached date.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sentinel key used when the payload carries no usable natural key.
pub const UNKNOWN_KEY: &str = "Unknown Data";

/// Store-assigned identifier.  Stable across updates to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fetched document, normalised for storage.  Sort with [`newest_first`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedRecord {
    pub id: RecordId,

    /// Natural key derived from the payload.
    #[serde(rename = "title")]
    pub key: String,

    /// Pretty-printed canonical JSON.  Opaque text from here on.
    #[serde(rename = "body")]
    pub payload: String,

    /// When the snapshot was fetched.
    #[serde(rename = "date_retrieved")]
    pub retrieved_at: DateTime<Utc>,
}

/// Display order: a greater `retrieved_at` sorts earlier, and equal
/// timestamps fall back to the greater id.
pub fn newest_first(a: &FetchedRecord, b: &FetchedRecord) -> Ordering {
    b.retrieved_at
        .cmp(&a.retrieved_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
pub(crate) fn make_record(id: u64, key: &str, retrieved_at: DateTime<Utc>) -> FetchedRecord {
    FetchedRecord {
        id: RecordId(id),
        key: key.to_string(),
        payload: "{}".to_string(),
        retrieved_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sort_newest_first() {
        let old = make_record(1, "Old", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mid = make_record(2, "Mid", Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap());
        let new = make_record(3, "New", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        let mut records = vec![old, new, mid];
        records.sort_by(newest_first);

        assert_eq!(records[0].key, "New", "newest first");
        assert_eq!(records[1].key, "Mid");
        assert_eq!(records[2].key, "Old", "oldest last");
    }

    #[test]
    fn equal_timestamps_prefer_greater_id() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let a = make_record(1, "A", ts);
        let b = make_record(2, "B", ts);
        assert_eq!(newest_first(&b, &a), Ordering::Less);
        assert_eq!(newest_first(&a, &a), Ordering::Equal);
    }

    #[test]
    fn serializes_with_persisted_field_names() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let value = serde_json::to_value(make_record(7, "BPI", ts)).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["title"], "BPI");
        assert_eq!(value["body"], "{}");
        assert_eq!(value["date_retrieved"], "2025-06-01T12:00:00Z");
    }

    #[test]
    fn record_id_display() {
        assert_eq!(RecordId(42).to_string(), "#42");
    }
}
