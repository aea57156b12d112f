use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::database::models::{PollingJob, PricePoint};
use crate::provider::ProviderKind;

/// Request to create a polling job
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    #[schema(example = json!(["AAPL", "MSFT"]))]
    pub symbols: Vec<String>,
    /// Seconds between polls, must be > 0
    #[schema(example = 60)]
    pub interval: i32,
    /// Provider identifier (default: yfinance)
    #[serde(default = "default_provider")]
    #[schema(example = "yfinance")]
    pub provider: String,
}

fn default_provider() -> String {
    ProviderKind::default().as_str().to_string()
}

/// Settings the job was created with
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobConfigResponse {
    pub symbols: Vec<String>,
    pub interval: i32,
}

/// Response after accepting a polling job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    #[schema(example = "accepted")]
    pub status: String,
    pub config: JobConfigResponse,
}

impl From<&PollingJob> for CreateJobResponse {
    fn from(job: &PollingJob) -> Self {
        Self {
            job_id: job.job_id,
            status: "accepted".to_string(),
            config: JobConfigResponse {
                symbols: job.symbols.clone(),
                interval: job.interval_secs,
            },
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LatestPriceQuery {
    /// Symbol to fetch (e.g., AAPL)
    pub symbol: String,
    /// Provider identifier (default: yfinance)
    pub provider: Option<String>,
}

/// Latest price fetched on demand
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceResponse {
    pub symbol: String,
    #[schema(value_type = f64, example = 189.5)]
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderKind,
}

impl From<PricePoint> for PriceResponse {
    fn from(point: PricePoint) -> Self {
        Self {
            symbol: point.symbol,
            price: point.price,
            timestamp: point.timestamp,
            provider: point.provider,
        }
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
