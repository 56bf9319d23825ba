//! HTTP transport seam
//!
//! Resolvers only need "GET this URL, give me status and body". [`Fetch`]
//! is that capability; [`HttpFetcher`] is the real one, tests plug in stubs.

use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};

const USER_AGENT: &str = concat!("trailcheck/", env!("CARGO_PKG_VERSION"));

/// Status and body of a completed request, whatever the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The service could not answer right now; a retry may succeed.
    pub fn is_transient(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

/// Fetch a URL.
///
/// `Err` means the request never completed (connection, TLS, timeout).
/// Non-2xx statuses are successful fetches.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<FetchResponse>;
}

/// Blocking `ureq` agent driven from tokio's blocking pool
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        let agent = self.agent.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &url))
            .await
            .wrap_err("Lookup task failed")?
    }
}

fn fetch_blocking(agent: &ureq::Agent, url: &str) -> Result<FetchResponse> {
    let mut response = agent
        .get(url)
        .header("User-Agent", USER_AGENT)
        .call()
        .wrap_err_with(|| format!("Failed to fetch {}", url))?;

    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .wrap_err_with(|| format!("Failed to read response body from {}", url))?;

    Ok(FetchResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(FetchResponse::new(200, "").is_success());
        assert!(!FetchResponse::new(404, "").is_success());
        assert!(!FetchResponse::new(404, "").is_transient());
        assert!(FetchResponse::new(429, "").is_transient());
        assert!(FetchResponse::new(503, "").is_transient());
    }
}
