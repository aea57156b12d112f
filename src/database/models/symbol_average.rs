use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Rolling moving average per symbol
///
/// Derived state only; written exclusively by the moving-average consumer
/// through an upsert keyed on `symbol`.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable, AsChangeset, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::symbol_averages)]
#[diesel(primary_key(symbol))]
pub struct SymbolAverage {
    pub symbol: String,
    #[schema(value_type = f64, example = 104.0)]
    #[serde(with = "rust_decimal::serde::float")]
    pub moving_average: Decimal,
    /// Event time of the newest price point in the window
    pub last_updated_at: DateTime<Utc>,
}
