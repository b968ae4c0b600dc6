//! Outbound HTTP abstraction.
//!
//! This module defines the [`HttpFetcher`] trait the pipeline fetches
//! through.  The production implementation lives in [`http`]; tests swap in
//! canned fetchers so no test touches the network.
//!
//! ## For contributors: adding a new transport
//!
//! 1. Create a new file in this directory (e.g. `file.rs` for local fixtures).
//! 2. Define a struct and implement [`HttpFetcher`] for it.
//! 3. Add `mod file;` below and re-export your struct.
//! 4. Construct it in `main::bootstrap` instead of [`HttpSource`].
//!
//! The pipeline, store and views never see which transport produced the bytes.

mod http;

pub use http::HttpSource;

use crate::error::FetchError;

/// Performs exactly one GET per call and hands back the raw body.
///
/// Implementations must not retry: a failed trigger waits for the next one.
/// The fetcher is shared between the scheduler thread and manual triggers,
/// so it must be [`Send`] + [`Sync`].
pub trait HttpFetcher: Send + Sync {
    /// Human-readable label used in log lines.
    fn name(&self) -> &str;

    /// Fetch `url` and return the response body.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// A fetcher that replays queued responses, for pipeline tests.
#[cfg(test)]
pub(crate) mod stub {
    use super::HttpFetcher;
    use crate::error::FetchError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    pub struct StubFetcher {
        responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn push_body(&self, body: &str) -> &Self {
            self.responses.lock().push_back(Ok(body.as_bytes().to_vec()));
            self
        }

        pub fn push_error(&self, err: FetchError) -> &Self {
            self.responses.lock().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl HttpFetcher for StubFetcher {
        fn name(&self) -> &str {
            "stub"
        }

        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().push(url.to_string());
            self.responses.lock().pop_front().unwrap_or_else(|| {
                Err(FetchError::Transport {
                    url: url.to_string(),
                    reason: "no stubbed response left".into(),
                })
            })
        }
    }
}
