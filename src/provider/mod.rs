/// Market data provider capability
///
/// The core only ever sees `fetch` and `parse`. A job stores a
/// `ProviderKind`; the matching capability is resolved through the
/// `ProviderRegistry` each time the job runs.

pub mod yfinance;

#[cfg(test)]
pub(crate) mod scripted;

pub use crate::database::enums::ProviderKind;

use crate::database::models::store_now;
pub use yfinance::YFinanceProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Provider failures, each a recoverable per-symbol outcome
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Network or HTTP failure talking to the vendor
    #[error("Provider unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    /// Vendor answered but had nothing usable for the symbol
    #[error("No data found for symbol: {0}")]
    NoData(String),

    /// Payload did not contain a usable price/time
    #[error("Failed to parse provider payload: {0}")]
    Parse(String),

    #[error("No provider registered for {0}")]
    UnknownProvider(ProviderKind),
}

/// Opaque vendor payload, stored verbatim as a raw response
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub symbol: String,
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl RawPayload {
    pub fn new(symbol: &str, data: serde_json::Value) -> Self {
        Self {
            symbol: symbol.to_string(),
            data,
            received_at: store_now(),
        }
    }
}

/// Price and provider-reported event time extracted from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPrice {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fetch the raw payload for `symbol`
    async fn fetch(&self, symbol: &str) -> Result<RawPayload, ProviderError>;

    /// Extract price and event time from a payload returned by `fetch`
    fn parse(&self, payload: &RawPayload) -> Result<ParsedPrice, ProviderError>;
}

/// Provider capabilities keyed by the identifier stored on jobs
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn MarketDataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its own `kind()`, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn MarketDataProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn MarketDataProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_reports_unknown_provider() {
        let registry = ProviderRegistry::new();

        let err = registry.get(ProviderKind::YFinance).err().unwrap();
        assert_eq!(err, ProviderError::UnknownProvider(ProviderKind::YFinance));
    }

    #[test]
    fn test_registry_resolves_by_kind() {
        let provider = Arc::new(YFinanceProvider::new("http://localhost:1"));
        let registry = ProviderRegistry::new().with(provider);

        assert_eq!(registry.get(ProviderKind::YFinance).unwrap().kind(), ProviderKind::YFinance);
    }
}
