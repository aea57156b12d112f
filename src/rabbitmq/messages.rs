use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::PricePoint;

/// Bus message announcing a committed price point
///
/// Wire format: `{id, symbol, price, provider, timestamp, raw_response_id}`
/// with `price` as a JSON number and `timestamp` as ISO-8601 UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub id: Uuid,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub raw_response_id: Uuid,
}

impl PriceEvent {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

impl From<&PricePoint> for PriceEvent {
    fn from(point: &PricePoint) -> Self {
        Self {
            id: point.id,
            symbol: point.symbol.clone(),
            price: point.price,
            provider: point.provider.as_str().to_string(),
            timestamp: point.timestamp,
            raw_response_id: point.raw_response_id,
        }
    }
}
