//! HTTP transport and access tokens.
//!
//! [`HttpFetch`] is the whole contract the client needs from the network:
//! one authenticated GET returning status and body. [`ReqwestTransport`] is
//! the production implementation with retry, exponential backoff and a
//! circuit breaker; tests substitute a scripted double.

use std::sync::Arc;
use std::time::Duration;

use marketsync_core::config::{FeedConfig, ENV_ACCESS_TOKEN};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::FeedError;

/// Status and raw body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpFetch {
    /// GET `endpoint` (relative to the API root) with query `params` and a
    /// bearer token.
    fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        bearer_token: &str,
    ) -> Result<HttpResponse, FeedError>;
}

/// Supplies the bearer token for each request. Acquisition and refresh
/// happen elsewhere.
pub trait TokenSource {
    fn access_token(&self) -> Result<String, FeedError>;
}

/// A token fixed at construction time.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .map(Self)
            .ok_or(FeedError::MissingToken(ENV_ACCESS_TOKEN))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String, FeedError> {
        Ok(self.0.clone())
    }
}

/// Blocking reqwest transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &FeedConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("marketsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            circuit_breaker,
            max_retries: config.retries(),
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

impl HttpFetch for ReqwestTransport {
    fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        bearer_token: &str,
    ) -> Result<HttpResponse, FeedError> {
        let url = format!("{}{endpoint}", self.base_url);
        let mut last: Option<Result<HttpResponse, FeedError>> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                debug!(endpoint, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(FeedError::CircuitBreakerTripped);
            }

            let sent = self
                .client
                .get(&url)
                .bearer_auth(bearer_token)
                .query(params)
                .send();
            let resp = match sent {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(endpoint, attempt, error = %e, "request did not complete");
                    last = Some(Err(FeedError::NetworkUnreachable(e.to_string())));
                    continue;
                }
                Err(e) => return Err(FeedError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                warn!(endpoint, "403 from market-data API; circuit breaker tripped");
                return Err(FeedError::CircuitBreakerTripped);
            }
            let body = resp.text()?;
            let response = HttpResponse {
                status: status.as_u16(),
                body,
            };
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                self.circuit_breaker.record_failure();
                warn!(endpoint, status = response.status, attempt, "transient failure");
                last = Some(Ok(response));
                continue;
            }
            if status.is_success() {
                self.circuit_breaker.record_success();
            }
            return Ok(response);
        }

        last.unwrap_or_else(|| Err(FeedError::NetworkUnreachable("max retries exceeded".into())))
    }
}

/// Longest pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff for retry `attempt` (1-based), capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}
