//! Blocking HTTP implementation of [`HttpFetcher`].
//!
//! One [`reqwest::blocking::Client`] is built up front and reused for every
//! trigger, so connection pooling and the request timeout apply uniformly to
//! manual and scheduled fetches.

use std::error::Error as StdError;
use std::time::Duration;

use anyhow::{Context, Result};

use super::HttpFetcher;
use crate::error::FetchError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Fetches a URL over HTTP(S) with a fixed timeout.
pub struct HttpSource {
    client: reqwest::blocking::Client,
    label: String,
}

impl HttpSource {
    /// Build a source whose requests give up after `timeout`.
    pub fn new(label: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            label: label.into(),
        })
    }
}

/// Flatten an error and its `source()` chain into one line.
///
/// reqwest's top-level message is often just "error sending request"; the
/// useful part (DNS, TLS, timeout) lives further down the chain.
fn describe(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        let text = inner.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        cause = inner.source();
    }
    out
}

impl HttpFetcher for HttpSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: if e.is_timeout() {
                    format!("timed out: {}", describe(&e))
                } else {
                    describe(&e)
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: describe(&e),
        })?;

        log::debug!("{}: fetched {} bytes from {}", self.label, body.len(), url);
        Ok(body.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one canned HTTP response on a loopback port.
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/v1/data.json")
    }

    /// Loopback requests must not be routed through an ambient proxy.
    fn source() -> HttpSource {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap();
        HttpSource {
            client,
            label: "test".into(),
        }
    }

    #[test]
    fn new_builds_a_client() {
        assert!(HttpSource::new("live", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn fetch_returns_body_on_success() {
        let url = serve_once("200 OK", r#"{"chartName":"BPI"}"#);
        let body = source().fetch(&url).unwrap();
        assert_eq!(body, br#"{"chartName":"BPI"}"#);
    }

    #[test]
    fn non_success_status_is_a_status_error() {
        let url = serve_once("503 Service Unavailable", "down");
        match source().fetch(&url) {
            Err(FetchError::Status { status, url: u }) => {
                assert_eq!(status, 503);
                assert_eq!(u, url);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn refused_connection_is_a_transport_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let url = format!("http://{addr}/");
        match source().fetch(&url) {
            Err(FetchError::Transport { url: u, reason }) => {
                assert_eq!(u, url);
                assert!(!reason.is_empty());
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn name_returns_label() {
        assert_eq!(source().name(), "test");
    }

    #[test]
    fn describe_walks_source_chain() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "error sending request")
            }
        }
        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "dns lookup failed"));
        assert_eq!(describe(&err), "error sending request: dns lookup failed");
    }
}
