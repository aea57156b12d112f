use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::database::enums::ProviderKind;
use crate::database::models::RawResponse;

/// Price observation for a symbol
///
/// `timestamp` is the provider-reported event time; `created_at` is when we
/// ingested it. `raw_response_id` is provenance only.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::price_points)]
#[diesel(primary_key(id))]
pub struct PricePoint {
    pub id: Uuid,
    pub symbol: String,
    #[schema(value_type = f64, example = 125.5)]
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub provider: ProviderKind,
    pub timestamp: DateTime<Utc>,
    pub raw_response_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PricePoint {
    /// Build a price point derived from `raw`
    pub fn from_raw(raw: &RawResponse, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: raw.symbol.clone(),
            price,
            provider: raw.provider,
            timestamp: super::store_time(timestamp),
            raw_response_id: raw.id,
            created_at: super::store_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_point_links_to_raw_response() {
        let raw = RawResponse::new(
            ProviderKind::YFinance,
            "AAPL",
            serde_json::json!({"regularMarketPrice": 189.5}),
        );
        let event_time = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        let point = PricePoint::from_raw(&raw, dec!(189.5), event_time);

        assert_eq!(point.symbol, "AAPL");
        assert_eq!(point.provider, ProviderKind::YFinance);
        assert_eq!(point.raw_response_id, raw.id);
        assert_eq!(point.timestamp, event_time);
        assert_ne!(point.id, raw.id);
    }
}
