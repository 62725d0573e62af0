//! MarketSync Feed — market-data pulls staged into the store.
//!
//! - `HttpFetch` transport contract with a retrying reqwest implementation
//! - Instruments, fundamentals and price history as polars frames
//! - Snapshot-stamped staging through the core bulk writer

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod flatten;
pub mod history;
pub mod pipeline;
pub mod transport;

pub use circuit_breaker::CircuitBreaker;
pub use client::MarketDataClient;
pub use error::FeedError;
pub use history::{FrequencyType, PeriodType, PriceHistoryRequest};
pub use pipeline::{stage_frame, StageReport};
pub use transport::{HttpFetch, HttpResponse, ReqwestTransport, StaticToken, TokenSource};
