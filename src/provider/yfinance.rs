use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

use super::{MarketDataProvider, ParsedPrice, ProviderError, ProviderKind, RawPayload};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart endpoint provider
///
/// `fetch` keeps the whole chart response as the raw payload; `parse` reads
/// `regularMarketPrice` and `regularMarketTime` from the chart meta block.
/// A flat quote object carrying the same two keys is accepted as well.
pub struct YFinanceProvider {
    client: Client,
    base_url: String,
}

impl YFinanceProvider {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0 (compatible; price-pipeline/0.1)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn chart_url(&self, symbol: &str) -> Result<Url, ProviderError> {
        let unavailable = |reason: String| ProviderError::Unavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| unavailable(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| unavailable(format!("base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        url.query_pairs_mut()
            .append_pair("interval", "1d")
            .append_pair("range", "1d");

        Ok(url)
    }

    /// Chart meta block, or the payload itself when it is already flat
    fn quote_block(data: &Value) -> &Value {
        data.pointer("/chart/result/0/meta").unwrap_or(data)
    }
}

impl Default for YFinanceProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl MarketDataProvider for YFinanceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YFinance
    }

    async fn fetch(&self, symbol: &str) -> Result<RawPayload, ProviderError> {
        let url = self.chart_url(symbol)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            ProviderError::Unavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NoData(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable {
                symbol: symbol.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let data: Value = response.json().await.map_err(|e| ProviderError::Unavailable {
            symbol: symbol.to_string(),
            reason: format!("invalid JSON body: {}", e),
        })?;

        let has_price = Self::quote_block(&data)
            .get("regularMarketPrice")
            .map_or(false, Value::is_number);
        if !has_price {
            tracing::warn!(symbol, "yfinance returned no valid data");
            return Err(ProviderError::NoData(symbol.to_string()));
        }

        Ok(RawPayload::new(symbol, data))
    }

    fn parse(&self, payload: &RawPayload) -> Result<ParsedPrice, ProviderError> {
        let quote = Self::quote_block(&payload.data);

        let raw_price = quote
            .get("regularMarketPrice")
            .and_then(Value::as_f64)
            .ok_or_else(|| ProviderError::Parse("missing or non-numeric regularMarketPrice".to_string()))?;

        let price = Decimal::try_from(raw_price)
            .map_err(|e| ProviderError::Parse(format!("price {} not representable: {}", raw_price, e)))?
            .normalize();

        if price <= Decimal::ZERO {
            return Err(ProviderError::Parse(format!("non-positive price {}", price)));
        }

        // Event time from the vendor; fetch time when the vendor omits it
        let timestamp = match quote.get("regularMarketTime") {
            None | Some(Value::Null) => payload.received_at,
            Some(value) => value
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .ok_or_else(|| ProviderError::Parse(format!("invalid regularMarketTime {}", value)))?,
        };

        Ok(ParsedPrice { price, timestamp })
    }
}
