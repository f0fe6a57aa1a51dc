//! HTTP client wrapper for whole-asset downloads with retry.

use std::time::Duration;

use reqwest::Client;

use crate::error::{CloudError, Result};

/// Downloads archive assets, retrying transient failures with exponential
/// backoff (100 ms, 200 ms, 400 ms, ...).
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            max_retries,
            request_timeout,
        })
    }

    /// Fetch the full body of `url`.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = backoff_delay(attempt);
                    tracing::debug!(url, attempt, ?backoff, error = %e, "retrying asset download");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CloudError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// The underlying client, shared with the STAC search.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100u64 << (attempt.saturating_sub(1)).min(10))
}
