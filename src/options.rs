//! Program-level configuration keys that outlive a single process.
//!
//! Holds the install metadata written on first bootstrap and the scheduler's
//! job book.  Teardown deletes every key listed in [`PLUGIN_KEYS`]; fetched
//! records live elsewhere and are not affected.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::OptionError;

pub const VERSION_KEY: &str = "version";
pub const INSTALL_TIME_KEY: &str = "install_time";
pub const CRON_KEY: &str = "cron";

/// Every key this program owns.
pub const PLUGIN_KEYS: &[&str] = &[VERSION_KEY, INSTALL_TIME_KEY, CRON_KEY];

/// A small persisted key/value map.  `path: None` keeps it in memory only.
///
/// With a path, the file is the source of truth: every read and every
/// read-modify-write re-reads it under the lock, so keys written or deleted
/// by another process are respected.
pub struct OptionStore {
    path: Option<PathBuf>,
    /// Last map read from or written to disk.
    values: Mutex<BTreeMap<String, Value>>,
}

impl OptionStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OptionError> {
        let path = path.into();
        let values = load(&path)?;
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, OptionError> {
        let mut values = self.values.lock();
        self.refresh(&mut values)?;
        values.get(key).map(|v| from_value(key, v)).transpose()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), OptionError> {
        let value = to_value(key, value)?;
        self.mutate(|values| {
            values.insert(key.to_string(), value);
            Ok(())
        })
    }

    /// Returns whether the key existed.
    pub fn delete(&self, key: &str) -> Result<bool, OptionError> {
        self.mutate(|values| Ok(values.remove(key).is_some()))
    }

    pub fn contains(&self, key: &str) -> Result<bool, OptionError> {
        let mut values = self.values.lock();
        self.refresh(&mut values)?;
        Ok(values.contains_key(key))
    }

    /// Read, change and write back one key as a single step.  `change` sees
    /// `None` when the key is absent; leaving `None` behind deletes it.
    pub fn update<T, R>(
        &self,
        key: &str,
        change: impl FnOnce(&mut Option<T>) -> R,
    ) -> Result<R, OptionError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.mutate(|values| {
            let mut slot = values.get(key).map(|v| from_value(key, v)).transpose()?;
            let out = change(&mut slot);
            match slot {
                Some(value) => {
                    values.insert(key.to_string(), to_value(key, &value)?);
                }
                None => {
                    values.remove(key);
                }
            }
            Ok(out)
        })
    }

    fn refresh(&self, values: &mut BTreeMap<String, Value>) -> Result<(), OptionError> {
        if let Some(path) = &self.path {
            *values = load(path)?;
        }
        Ok(())
    }

    /// Apply `change` to the current contents and persist the result if it
    /// differs.  Nothing is written or published when `change` fails.
    fn mutate<R>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, Value>) -> Result<R, OptionError>,
    ) -> Result<R, OptionError> {
        let mut values = self.values.lock();
        self.refresh(&mut values)?;
        let mut next = values.clone();
        let out = change(&mut next)?;
        if next != *values {
            if let Some(path) = &self.path {
                persist(path, &next)?;
            }
            *values = next;
        }
        Ok(out)
    }

    /// Record the running version and first install time, once.
    pub fn install(&self, now: DateTime<Utc>) -> Result<(), OptionError> {
        let first_run = self.mutate(|values| {
            values
                .entry(VERSION_KEY.to_string())
                .or_insert_with(|| Value::from(env!("CARGO_PKG_VERSION")));
            if values.contains_key(INSTALL_TIME_KEY) {
                return Ok(false);
            }
            values.insert(INSTALL_TIME_KEY.to_string(), Value::from(now.timestamp()));
            Ok(true)
        })?;
        if first_run {
            log::info!("First run; install time recorded");
        }
        Ok(())
    }

    /// Delete every program-owned key.  Returns the keys that were present.
    pub fn remove_plugin_keys(&self) -> Result<Vec<&'static str>, OptionError> {
        self.mutate(|values| {
            let mut removed = Vec::new();
            for key in PLUGIN_KEYS {
                if values.remove(*key).is_some() {
                    removed.push(*key);
                }
            }
            Ok(removed)
        })
    }
}

fn from_value<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, OptionError> {
    serde_json::from_value(value.clone()).map_err(|e| OptionError::Shape {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: Serialize>(key: &str, value: &T) -> Result<Value, OptionError> {
    serde_json::to_value(value).map_err(|e| OptionError::Shape {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// A missing file is an empty map.
fn load(path: &Path) -> Result<BTreeMap<String, Value>, OptionError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    serde_json::from_str(&text).map_err(|e| OptionError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn persist(path: &Path, values: &BTreeMap<String, Value>) -> Result<(), OptionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let json = serde_json::to_string_pretty(values).map_err(|e| OptionError::Shape {
        key: "*".to_string(),
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|source| io_error(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> OptionError {
    OptionError::Io {
        path: path.display().to_string(),
        source,
    }
}
