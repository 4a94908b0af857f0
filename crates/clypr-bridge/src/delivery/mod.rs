//! Retrying, timeout-bounded HTTP delivery.
//!
//! Every attempt carries its own timeout. Failed attempts are retried with a
//! deterministic exponential backoff (`backoff * 2^attempt`, no jitter), so a
//! permanently failing target costs at most `retries + 1` attempts and
//! `dns + (retries + 1) * timeout + sum(backoff * 2^i)` of wall time, where
//! `dns` is the capped diagnostic lookup that precedes the first attempt.

mod error;

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};
use url::{Host, Url};

use clypr_bridge_protocol::RetryConfig;

pub use error::DeliveryError;

/// Cap on the diagnostic DNS lookup before the first attempt.
const DNS_LOOKUP_BUDGET: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Timeout and retry budget for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            retries: 2,
            backoff: Duration::from_millis(1_000),
        }
    }
}

impl DeliveryPolicy {
    /// Apply a job's retry override. `maxAttempts` counts the first attempt.
    pub fn with_overrides(mut self, overrides: Option<&RetryConfig>) -> Self {
        let Some(cfg) = overrides else {
            return self;
        };
        if let Some(max_attempts) = cfg.max_attempts.filter(|n| *n > 0) {
            self.retries = max_attempts - 1;
        }
        if let Some(ms) = cfg.timeout_ms.filter(|ms| *ms > 0) {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = cfg.backoff_ms {
            self.backoff = Duration::from_millis(ms);
        }
        self
    }

    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Time allowed for the diagnostic DNS lookup.
    pub fn dns_budget(&self) -> Duration {
        self.timeout.min(DNS_LOOKUP_BUDGET)
    }

    /// Upper bound on the time one delivery can take.
    pub fn max_elapsed(&self) -> Duration {
        let waits = (0..self.retries)
            .map(|i| self.backoff_for(i))
            .fold(Duration::ZERO, Duration::saturating_add);
        self.timeout
            .saturating_mul(self.retries.saturating_add(1))
            .saturating_add(waits)
            .saturating_add(self.dns_budget())
    }
}

/// A fully built outbound request.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Final response of a delivery.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    pub status: StatusCode,
    pub body: String,
    /// Attempts made, including the one that produced this response.
    pub attempts: u32,
}

impl DeliveryResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

// ============================================================================
// HttpDelivery
// ============================================================================

/// HTTP client wrapper implementing the retry policy.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: Client,
}

impl HttpDelivery {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Execute `request` under `policy`.
    ///
    /// Retryable statuses (5xx, 429) are retried while budget remains; once
    /// it is spent the last response is returned as-is. Transport errors
    /// propagate when they are not retryable or the budget is spent.
    pub async fn execute(
        &self,
        request: &DeliveryRequest,
        policy: &DeliveryPolicy,
    ) -> Result<DeliveryResponse, DeliveryError> {
        if !matches!(request.url.scheme(), "http" | "https") {
            return Err(DeliveryError::InvalidRequest(format!(
                "unsupported url scheme {:?}",
                request.url.scheme()
            )));
        }
        resolve_for_diagnostics(&request.url, policy.dns_budget()).await;

        let host = request.url.host_str().unwrap_or_default().to_string();
        let mut attempt: u32 = 0;

        loop {
            let number = attempt + 1;
            let result = match tokio::time::timeout(policy.timeout, self.send_once(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(policy.timeout)),
            };
            let exhausted = attempt >= policy.retries;

            match result {
                Ok((status, body)) => {
                    if !is_retryable_status(status) || exhausted {
                        debug!(host = %host, status = status.as_u16(), attempts = number, "Delivery finished");
                        return Ok(DeliveryResponse {
                            status,
                            body,
                            attempts: number,
                        });
                    }
                    warn!(host = %host, status = status.as_u16(), attempt = number, "Delivery attempt got retryable status");
                }
                Err(err) => {
                    if !err.is_retryable() || exhausted {
                        return Err(err);
                    }
                    warn!(host = %host, attempt = number, error = %err, "Delivery attempt failed, retrying");
                }
            }

            tokio::time::sleep(policy.backoff_for(attempt)).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        request: &DeliveryRequest,
    ) -> Result<(StatusCode, String), DeliveryError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(DeliveryError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Result of the diagnostic lookup. Only logged; never aborts delivery.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Skipped,
    Resolved(Vec<IpAddr>),
    Failed,
    TimedOut,
}

/// Resolve the target host for logging only, within `budget`.
async fn resolve_for_diagnostics(url: &Url, budget: Duration) -> Resolution {
    let Some(Host::Domain(host)) = url.host() else {
        return Resolution::Skipped;
    };
    let port = url.port_or_known_default().unwrap_or(80);
    bounded_lookup(host, tokio::net::lookup_host((host, port)), budget).await
}

async fn bounded_lookup<F, I>(host: &str, lookup: F, budget: Duration) -> Resolution
where
    F: Future<Output = io::Result<I>>,
    I: Iterator<Item = SocketAddr>,
{
    match tokio::time::timeout(budget, lookup).await {
        Ok(Ok(addrs)) => {
            let addrs: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
            debug!(host, ?addrs, "Resolved delivery target");
            Resolution::Resolved(addrs)
        }
        Ok(Err(e)) => {
            warn!(host, error = %e, "DNS pre-resolution failed, attempting delivery anyway");
            Resolution::Failed
        }
        Err(_) => {
            warn!(host, budget_ms = budget.as_millis() as u64, "DNS pre-resolution timed out, attempting delivery anyway");
            Resolution::TimedOut
        }
    }
}
