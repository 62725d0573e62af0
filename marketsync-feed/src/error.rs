//! Structured error types for market-data pulls.

use marketsync_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// The API answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    RemoteFetchFailure {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no access token available: set {0}")]
    MissingToken(&'static str),

    #[error("hard stop: market-data API is refusing requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("frame error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}
