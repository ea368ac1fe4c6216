use std::error::Error;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::Settings;
use crate::error::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; script-harvest/0.1)";

/// Body and status of a successful (2xx) response.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Retrieval of one remote resource. Every failure is a [`FetchError`] value.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError>;
}

/// Single-attempt HTTP GET with a fixed user agent and bounded timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFetcher { client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.user_agent, settings.timeout())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response.bytes().await.map_err(transport_error)?;
        debug!(
            "GET {} -> {} ({} bytes, {}ms)",
            url,
            status.as_u16(),
            body.len(),
            start.elapsed().as_millis()
        );

        Ok(Fetched {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    // reqwest's Display stops at the outermost layer; include the causes.
    let mut reason = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    if e.is_timeout() {
        FetchError::timeout(reason)
    } else {
        FetchError::transport(reason)
    }
}
