use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::database::enums::ProviderKind;

/// Raw provider payload kept for audit and reprocessing
///
/// Append-only. The id is generated client-side so a price point can point
/// at its raw response before either row is written.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::raw_responses)]
#[diesel(primary_key(id))]
pub struct RawResponse {
    pub id: Uuid,
    pub provider: ProviderKind,
    pub symbol: String,
    #[schema(value_type = Object)]
    pub response_data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl RawResponse {
    pub fn new(provider: ProviderKind, symbol: &str, response_data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            symbol: symbol.to_string(),
            response_data,
            received_at: super::store_now(),
        }
    }
}
