//! Named entry points into the pipeline.
//!
//! Whatever starts a run (a CLI subcommand, a key press in the terminal
//! view, a scheduled job) looks its handler up here by name, so every entry
//! point shares the same wiring.  [`spawn_worker`] runs a trigger on its own
//! thread for callers that must not block.

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::thread;

use crate::error::TriggerError;
use crate::pipeline::PipelineResult;

/// Manual, synchronous fetch.
pub const FETCH_NOW: &str = "fetch-now";
/// The recurring job's task name.
pub const SCHEDULED_FETCH: &str = "api_data_fetch_cron";

pub type TriggerHandler = dyn Fn() -> PipelineResult + Send + Sync;

pub type TriggerOutcome = Result<PipelineResult, TriggerError>;

#[derive(Default, Clone)]
pub struct TriggerRegistry {
    handlers: BTreeMap<String, Arc<TriggerHandler>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn() -> PipelineResult + Send + Sync + 'static,
    {
        if self
            .handlers
            .insert(name.to_string(), Arc::new(handler))
            .is_some()
        {
            log::debug!("Trigger {name} re-registered");
        }
    }

    pub fn invoke(&self, name: &str) -> TriggerOutcome {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| TriggerError::Unknown(name.to_string()))?;
        log::debug!("Trigger {name} invoked");
        Ok(handler())
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Spawn a thread that invokes `name` once for every `()` sent on the
/// returned sender and reports each outcome on the returned receiver.
///
/// The thread stops once the sender is dropped or a result can no longer be
/// delivered.
pub fn spawn_worker(
    registry: TriggerRegistry,
    name: &str,
) -> (mpsc::Sender<()>, mpsc::Receiver<TriggerOutcome>) {
    let (request_tx, request_rx) = mpsc::channel::<()>();
    let (result_tx, result_rx) = mpsc::channel();
    let name = name.to_string();

    thread::spawn(move || {
        for () in request_rx {
            if result_tx.send(registry.invoke(&name)).is_err() {
                return;
            }
        }
    });

    (request_tx, result_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, PipelineError};
    use crate::record::{make_record, FetchedRecord};
    use chrono::Utc;

    fn ok_record() -> FetchedRecord {
        make_record(1, "BPI", Utc::now())
    }

    #[test]
    fn invoke_dispatches_by_name() {
        let mut registry = TriggerRegistry::new();
        registry.register(FETCH_NOW, || Ok(ok_record()));
        registry.register(SCHEDULED_FETCH, || Err(DecodeError::Empty.into()));

        assert_eq!(registry.invoke(FETCH_NOW).unwrap().unwrap().key, "BPI");
        assert!(matches!(
            registry.invoke(SCHEDULED_FETCH).unwrap(),
            Err(PipelineError::Decode(DecodeError::Empty))
        ));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = TriggerRegistry::new();
        assert_eq!(
            registry.invoke("nope").unwrap_err(),
            TriggerError::Unknown("nope".into())
        );
    }

    #[test]
    fn names_are_sorted_and_unique() {
        let mut registry = TriggerRegistry::new();
        registry.register(SCHEDULED_FETCH, || Ok(ok_record()));
        registry.register(FETCH_NOW, || Ok(ok_record()));
        registry.register(FETCH_NOW, || Ok(ok_record()));
        assert_eq!(registry.names(), [SCHEDULED_FETCH, FETCH_NOW]);
    }

    #[test]
    fn worker_runs_trigger_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let mut registry = TriggerRegistry::new();
        registry.register(FETCH_NOW, move || {
            assert_ne!(std::thread::current().id(), caller);
            Ok(ok_record())
        });

        let (requests, results) = spawn_worker(registry.clone(), FETCH_NOW);
        requests.send(()).unwrap();
        requests.send(()).unwrap();
        for _ in 0..2 {
            let outcome = results.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
            assert_eq!(outcome.unwrap().unwrap().key, "BPI");
        }

        let (requests, results) = spawn_worker(registry, "nope");
        requests.send(()).unwrap();
        assert_eq!(
            results
                .recv_timeout(std::time::Duration::from_secs(5))
                .unwrap()
                .unwrap_err(),
            TriggerError::Unknown("nope".into())
        );
    }
}
