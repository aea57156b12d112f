use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{MarketDataProvider, ParsedPrice, ProviderError, ProviderKind, RawPayload, YFinanceProvider};

/// Provider answering from a per-symbol script instead of the network
///
/// Payloads use the flat quote shape and are parsed exactly like live
/// yfinance data. Unscripted symbols answer `NoData`.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    script: Mutex<HashMap<String, Result<Value, ProviderError>>>,
    fetches: AtomicUsize,
    parser: YFinanceProvider,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote `symbol` at `price` with event time `time` (unix seconds)
    pub fn quote(self, symbol: &str, price: f64, time: i64) -> Self {
        self.set(
            symbol,
            Ok(json!({
                "symbol": symbol,
                "regularMarketPrice": price,
                "regularMarketTime": time
            })),
        );
        self
    }

    pub fn payload(self, symbol: &str, data: Value) -> Self {
        self.set(symbol, Ok(data));
        self
    }

    pub fn failing(self, symbol: &str) -> Self {
        self.set(
            symbol,
            Err(ProviderError::Unavailable {
                symbol: symbol.to_string(),
                reason: "connection refused".to_string(),
            }),
        );
        self
    }

    pub fn set(&self, symbol: &str, outcome: Result<Value, ProviderError>) {
        self.script.lock().insert(symbol.to_string(), outcome);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YFinance
    }

    async fn fetch(&self, symbol: &str) -> Result<RawPayload, ProviderError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        match self.script.lock().get(symbol) {
            Some(Ok(data)) => Ok(RawPayload::new(symbol, data.clone())),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ProviderError::NoData(symbol.to_string())),
        }
    }

    fn parse(&self, payload: &RawPayload) -> Result<ParsedPrice, ProviderError> {
        self.parser.parse(payload)
    }
}
