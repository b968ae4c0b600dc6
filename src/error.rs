//! Error vocabulary for every stage of the fetch pipeline.
//!
//! Each stage owns its own enum so the pipeline can report exactly which step
//! failed.  [`PipelineError`] wraps the three stage errors; everything above
//! the pipeline (CLI, scheduler callbacks, the terminal view) works with
//! [`anyhow`].

use thiserror::Error;

/// The outbound GET failed.  Every variant carries the endpoint so log lines
/// are diagnosable on their own.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not read response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// The fetched bytes could not be turned into a record.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("response body is empty")]
    Empty,

    #[error("response body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response decoded to an empty document ({0})")]
    EmptyDocument(&'static str),

    #[error("could not serialize payload: {0}")]
    Serialize(String),
}

/// The record store could not be read or written.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("could not serialize store contents: {0}")]
    Serialize(String),

    #[error("no record ids left to assign")]
    IdsExhausted,
}

/// Which stage of a pipeline run failed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Short stage label used in status lines.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Decode(_) => "decode",
            Self::Store(_) => "store",
        }
    }
}

/// Invalid command-line or environment configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid endpoint URL {input}: {reason}")]
    InvalidEndpoint { input: String, reason: String },

    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },

    #[error("key field path must not be empty")]
    EmptyKeyField,

    #[error("could not determine a data directory; pass --data-dir")]
    NoDataDir,
}

/// The option store could not be read or written.
#[derive(Error, Debug)]
pub enum OptionError {
    #[error("option file I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("option file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("option {key} has an unexpected shape: {reason}")]
    Shape { key: String, reason: String },
}

/// A named trigger could not be dispatched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TriggerError {
    #[error("no trigger registered under {0:?}")]
    Unknown(String),
}
