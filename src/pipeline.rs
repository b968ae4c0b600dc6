//! The fetch → decode → upsert routine every trigger runs.
//!
//! ```text
//! ┌──────────────┐ bytes ┌────────────────┐ key, payload ┌──────────────┐
//! │ HttpFetcher  │ ────► │ PayloadDecoder │ ───────────► │ RecordStore  │
//! └──────────────┘       └────────────────┘              └──────────────┘
//! ```
//!
//! A run performs one outbound request and at most one store mutation.  Any
//! failure is logged here, with the endpoint, and returned as a
//! [`PipelineError`]; nothing panics back into the trigger that called it.

use std::sync::Arc;

use crate::clock::Clock;
use crate::decode::PayloadDecoder;
use crate::error::PipelineError;
use crate::record::FetchedRecord;
use crate::source::HttpFetcher;
use crate::store::RecordStore;

/// Outcome of one run: the stored record, or the stage that failed.
pub type PipelineResult = Result<FetchedRecord, PipelineError>;

/// Wires the three stages together.  Built once at startup and shared by
/// every trigger.
pub struct FetchPipeline {
    endpoint: String,
    fetcher: Arc<dyn HttpFetcher>,
    decoder: PayloadDecoder,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl FetchPipeline {
    pub fn new(
        endpoint: impl Into<String>,
        fetcher: Arc<dyn HttpFetcher>,
        decoder: PayloadDecoder,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            fetcher,
            decoder,
            store,
            clock,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn run(&self) -> PipelineResult {
        let result = self.try_run();
        match &result {
            Ok(record) => log::info!(
                "Stored {} \"{}\" from {} ({} bytes)",
                record.id,
                record.key,
                self.endpoint,
                record.payload.len()
            ),
            Err(PipelineError::Fetch(e)) => {
                log::error!("Failed to fetch API data via {}: {}", self.fetcher.name(), e)
            }
            Err(PipelineError::Decode(e)) => {
                log::error!("Invalid API response from {}: {}", self.endpoint, e)
            }
            Err(PipelineError::Store(e)) => {
                log::error!("Could not store data fetched from {}: {}", self.endpoint, e)
            }
        }
        result
    }

    fn try_run(&self) -> PipelineResult {
        let bytes = self.fetcher.fetch(&self.endpoint)?;
        let decoded = self.decoder.decode(&bytes)?;
        let record = self
            .store
            .upsert(&decoded.key, &decoded.payload, self.clock.now())?;
        Ok(record)
    }
}
