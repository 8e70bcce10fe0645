//! Remote resource repository behind an async trait, plus the HTTP
//! implementation used in server output mode.

use std::time::Duration;

use async_trait::async_trait;

use clinfhir_core::Bundle;

use crate::error::{Result, SinkError};

/// A store that applies one bundle as an atomic transaction.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn submit(&self, bundle: &Bundle) -> Result<()>;
}

/// Bounded retry with exponential backoff, applied to transport faults only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry, doubling per attempt: base, 2×base, …
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt - 1)
    }
}

/// Submits bundles to a remote repository endpoint over HTTP.
pub struct HttpRepository {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl HttpRepository {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_retry(endpoint, RetryPolicy::default())
    }

    pub fn with_retry(endpoint: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: None,
            retry,
        }
    }

    /// Bearer token sent with every submission.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn submit_once(&self, bundle: &Bundle) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(bundle);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SinkError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // Overload and gateway statuses are transient server-side conditions,
        // not verdicts on the bundle; treat them like transport faults.
        if matches!(status.as_u16(), 429 | 502 | 503 | 504) {
            return Err(SinkError::transport(format!(
                "server unavailable: {status}"
            )));
        }
        let message = response.text().await.unwrap_or_default();
        Err(SinkError::TransactionRejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ResourceRepository for HttpRepository {
    /// Retries transport faults up to the policy's attempt bound. A rejected
    /// transaction surfaces immediately.
    async fn submit(&self, bundle: &Bundle) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.submit_once(bundle).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_before(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient submission failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
