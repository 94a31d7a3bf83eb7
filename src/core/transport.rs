//! HTTP transport used by every probe.
//!
//! Probes only see the [`Transport`] trait so tests can substitute scripted
//! fakes for real network access.

use std::time::{Duration, Instant};

use reqwest::blocking::Client;

use crate::constants;
use crate::error::ProbeError;

/// Minimal request surface the probes need.
pub trait Transport: Send + Sync {
    /// Readable request: returns the response body whatever the status code.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Network`] if no response was received.
    fn get_text(&self, url: &str) -> Result<String, ProbeError>;

    /// Readable request that only accepts a success status.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Network`] if no response was received and
    /// [`ProbeError::Status`] for a non-2xx answer.
    fn get_success_text(&self, url: &str) -> Result<String, ProbeError>;

    /// Opaque request: only completion is observable, the body is never read.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Network`] if no response was received.
    fn reach(&self, url: &str) -> Result<(), ProbeError>;
}

/// Runs `op` and returns its result with the elapsed wall-clock milliseconds.
pub fn timed<T>(op: impl FnOnce() -> T) -> (T, u64) {
    let start = Instant::now();
    let out = op();
    let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    (out, elapsed)
}

/// Joins the portal base URL and an absolute API path.
#[must_use]
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

/// `reqwest`-backed transport with a shared cookie store.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(format!("{}/{}", constants::APP_NAME, constants::APP_VERSION))
            .build()?;
        Ok(Self { client })
    }

    /// Underlying client, for collaborators that need headers or forms.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String, ProbeError> {
        let response = self.client.get(url).send()?;
        Ok(response.text()?)
    }

    fn get_success_text(&self, url: &str) -> Result<String, ProbeError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        Ok(response.text()?)
    }

    fn reach(&self, url: &str) -> Result<(), ProbeError> {
        self.client.get(url).send()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(endpoint("http://portal/", "/health"), "http://portal/health");
        assert_eq!(endpoint("http://portal", "/health"), "http://portal/health");
    }

    #[test]
    fn test_timed_returns_value() {
        let (value, elapsed) = timed(|| 7);
        assert_eq!(value, 7);
        assert!(elapsed < 1000);
    }
}
