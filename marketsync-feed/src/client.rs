//! Market-data API client.
//!
//! Symbol lists are split into requests of at most 500 symbols. Every
//! response is flattened into a frame and stamped with a `fetch_at` column.

use chrono::{DateTime, Utc};
use marketsync_core::config::MAX_SYMBOLS_PER_REQUEST;
use marketsync_core::SqlValue;
use polars::prelude::DataFrame;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::flatten::FlatRecords;
use crate::history::PriceHistoryRequest;
use crate::transport::{HttpFetch, TokenSource};

pub const INSTRUMENTS_ENDPOINT: &str = "/instruments";
pub const PRICE_HISTORY_ENDPOINT: &str = "/pricehistory";

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    #[serde(default)]
    instruments: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct PriceHistoryResponse {
    #[serde(default)]
    candles: Vec<Map<String, Value>>,
    symbol: Option<String>,
}

/// Projection requested from the instruments endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    SymbolSearch,
    Fundamental,
}

impl Projection {
    fn as_str(self) -> &'static str {
        match self {
            Projection::SymbolSearch => "symbol-search",
            Projection::Fundamental => "fundamental",
        }
    }
}

/// Clamp a requested chunk size to what the API accepts.
pub fn clamp_chunk_size(requested: usize) -> usize {
    if requested > MAX_SYMBOLS_PER_REQUEST {
        warn!(
            requested,
            limit = MAX_SYMBOLS_PER_REQUEST,
            "the API limits symbols per request; using the limit"
        );
        MAX_SYMBOLS_PER_REQUEST
    } else {
        requested.max(1)
    }
}

pub struct MarketDataClient<H, K> {
    http: H,
    tokens: K,
}

impl<H: HttpFetch, K: TokenSource> MarketDataClient<H, K> {
    pub fn new(http: H, tokens: K) -> Self {
        Self { http, tokens }
    }

    pub fn transport(&self) -> &H {
        &self.http
    }

    /// Reference data for `symbols`, one row per instrument.
    pub fn instruments<S: AsRef<str>>(
        &self,
        symbols: &[S],
        chunk_size: usize,
    ) -> Result<DataFrame, FeedError> {
        self.instrument_frames(symbols, chunk_size, Projection::SymbolSearch)
    }

    /// Fundamental data for `symbols`, one row per instrument that has any.
    pub fn fundamentals<S: AsRef<str>>(
        &self,
        symbols: &[S],
        chunk_size: usize,
    ) -> Result<DataFrame, FeedError> {
        self.instrument_frames(symbols, chunk_size, Projection::Fundamental)
    }

    fn instrument_frames<S: AsRef<str>>(
        &self,
        symbols: &[S],
        chunk_size: usize,
        projection: Projection,
    ) -> Result<DataFrame, FeedError> {
        let chunk_size = clamp_chunk_size(chunk_size);
        let mut collected = FlatRecords::default();

        for chunk in symbols.chunks(chunk_size) {
            let joined = chunk
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(",");
            let params = [
                ("symbol", joined.clone()),
                ("projection", projection.as_str().to_string()),
            ];
            let resp: InstrumentsResponse = self.fetch_json(INSTRUMENTS_ENDPOINT, &params)?;
            if resp.instruments.is_empty() {
                warn!(symbols = %joined, "no instruments in response");
                continue;
            }

            let flat = match projection {
                Projection::SymbolSearch => FlatRecords::from_records(&resp.instruments),
                Projection::Fundamental => {
                    let fundamentals: Vec<&Map<String, Value>> = resp
                        .instruments
                        .iter()
                        .filter_map(|inst| inst.get("fundamental").and_then(Value::as_object))
                        .collect();
                    if fundamentals.is_empty() {
                        warn!(symbols = %joined, "no fundamental data in response");
                        continue;
                    }
                    FlatRecords::from_records(fundamentals)
                }
            };
            debug!(rows = flat.rows.len(), projection = projection.as_str(), "chunk fetched");
            collected.extend(flat);
        }

        if collected.is_empty() {
            return Ok(DataFrame::empty());
        }
        collected.set_constant("fetch_at", SqlValue::Timestamp(Utc::now().naive_utc()));
        info!(rows = collected.rows.len(), projection = projection.as_str(), "instruments fetched");
        Ok(collected.into_frame()?)
    }

    /// OHLCV candles for one symbol. `datetime` arrives as epoch milliseconds
    /// and is returned as a timestamp.
    pub fn price_history(&self, request: &PriceHistoryRequest) -> Result<DataFrame, FeedError> {
        request.validate()?;
        let resp: PriceHistoryResponse =
            self.fetch_json(PRICE_HISTORY_ENDPOINT, &request.query_params())?;
        if resp.candles.is_empty() {
            warn!(symbol = %request.symbol, "no candles in response");
        }

        let mut flat = FlatRecords::from_records(&resp.candles);
        flat.map_column("datetime", |cell| match cell {
            SqlValue::Int(ms) => DateTime::from_timestamp_millis(ms)
                .map_or(SqlValue::Null, |dt| SqlValue::Timestamp(dt.naive_utc())),
            other => other,
        });
        let symbol = resp.symbol.unwrap_or_else(|| request.symbol.clone());
        flat.set_constant("symbol", SqlValue::Text(symbol));
        flat.set_constant("fetch_at", SqlValue::Timestamp(Utc::now().naive_utc()));
        info!(symbol = %request.symbol, candles = flat.rows.len(), "price history fetched");
        Ok(flat.into_frame()?)
    }

    fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let token = self.tokens.access_token()?;
        let resp = self.http.get(endpoint, params, &token)?;
        if !resp.is_success() {
            warn!(endpoint, status = resp.status, body = %resp.body, "market-data request failed");
            return Err(FeedError::RemoteFetchFailure {
                endpoint: endpoint.to_string(),
                status: resp.status,
                body: resp.body,
            });
        }
        serde_json::from_str(&resp.body).map_err(|e| {
            FeedError::ResponseFormatChanged(format!("failed to parse {endpoint} response: {e}"))
        })
    }
}
