//! HTTP transfer with bounded exponential backoff.
//!
//! Timeouts, connection failures, HTTP 429 and 5xx responses are retried.
//! Any other non-success status is fatal and is not retried.
//!
//! Error reasons never carry the request URL: query strings may hold API keys.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use shared::{PipelineError, PipelineResult, PipelineStage};

/// What to do with a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Retry,
    Fatal,
}

pub fn classify_status(status: StatusCode) -> Disposition {
    if status.is_success() {
        Disposition::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Disposition::Retry
    } else {
        Disposition::Fatal
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Transport error text with the URL stripped
fn describe(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

/// Fetches bytes for a URL, retrying transient failures
#[derive(Clone)]
pub struct RetryingFetcher {
    client: Client,
    service: &'static str,
    stage: PipelineStage,
    max_retries: u32,
    backoff_base: Duration,
    request_timeout: Duration,
}

impl RetryingFetcher {
    /// Create a fetcher; `service` names the collaborator in error messages
    /// and `stage` is the pipeline stage its failures are reported under
    pub fn new(
        service: &'static str,
        stage: PipelineStage,
        request_timeout: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PipelineError::Upstream {
                stage,
                service: service.to_string(),
                reason: format!("failed to build HTTP client: {}", describe(e)),
            })?;

        Ok(Self {
            client,
            service,
            stage,
            max_retries,
            backoff_base,
            request_timeout,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// GET `url` and return the whole body
    pub async fn fetch_bytes(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let response = self.send(self.client.get(url), url).await?;
        let bytes = response.bytes().await.map_err(|e| PipelineError::TransientFetch {
            stage: self.stage,
            url: url.to_string(),
            attempts: 1,
            reason: format!("body read failed: {}", describe(e)),
        })?;
        tracing::debug!(service = self.service, url, bytes = bytes.len(), "Download complete");
        Ok(bytes.to_vec())
    }

    /// Send a request, retrying per the transfer policy.
    ///
    /// `url` is what appears in logs and errors; pass it without secrets.
    /// Returns only successful responses.
    pub async fn send(&self, request: RequestBuilder, url: &str) -> PipelineResult<Response> {
        let mut last_reason = String::new();
        let attempts = self.max_retries + 1;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.backoff_base, attempt);
                tracing::warn!(
                    service = self.service,
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %last_reason,
                    "Retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let Some(cloned) = request.try_clone() else {
                return Err(PipelineError::Upstream {
                    stage: self.stage,
                    service: self.service.to_string(),
                    reason: "request body cannot be replayed".to_string(),
                });
            };

            match tokio::time::timeout(self.request_timeout, cloned.send()).await {
                Err(_) => {
                    last_reason = format!("timed out after {}s", self.request_timeout.as_secs());
                }
                Ok(Err(e)) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    last_reason = describe(e);
                }
                Ok(Err(e)) => {
                    return Err(PipelineError::Upstream {
                        stage: self.stage,
                        service: self.service.to_string(),
                        reason: describe(e),
                    });
                }
                Ok(Ok(response)) => match classify_status(response.status()) {
                    Disposition::Success => return Ok(response),
                    Disposition::Retry => {
                        last_reason = format!("HTTP {}", response.status());
                    }
                    Disposition::Fatal => {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        return Err(PipelineError::Upstream {
                            stage: self.stage,
                            service: self.service.to_string(),
                            reason: format!("HTTP {} - {}", status, body),
                        });
                    }
                },
            }
        }

        Err(PipelineError::TransientFetch {
            stage: self.stage,
            url: url.to_string(),
            attempts,
            reason: last_reason,
        })
    }
}
