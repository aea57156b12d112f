use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{JobValidationError, NewPollingJob, PollingJob, SymbolAverage};
use crate::database::repositories::{AverageRepository, JobRepository};
use crate::database::DatabaseError;
use crate::ingestion::{IngestionError, IngestionExecutor};
use crate::provider::ProviderKind;

use super::responses::*;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct ApiState {
    pub jobs: Arc<dyn JobRepository>,
    pub averages: Arc<dyn AverageRepository>,
    pub executor: Arc<IngestionExecutor>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl From<JobValidationError> for ApiError {
    fn from(err: JobValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        tracing::error!("Database error: {}", err);
        ApiError::Internal(err.to_string())
    }
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::NoData(_) => ApiError::NotFound(err.to_string()),
            IngestionError::UnknownProvider(_) => ApiError::BadRequest(err.to_string()),
            IngestionError::Provider(_) => ApiError::Upstream(err.to_string()),
            IngestionError::Persistence(e) => e.into(),
            IngestionError::TaskJoin(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

fn parse_provider(provider: Option<&str>) -> Result<ProviderKind, ApiError> {
    match provider {
        None => Ok(ProviderKind::default()),
        Some(name) => ProviderKind::from_str(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown provider: {}", name))),
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Create a polling job
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "Jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 202, description = "Job accepted", body = CreateJobResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_job(
    State(state): State<ApiState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let provider = parse_provider(Some(&request.provider))?;
    let new_job = NewPollingJob::new(request.symbols, request.interval, provider)?;
    let job = state.jobs.create(new_job)?;

    tracing::info!(
        job_id = %job.job_id,
        "Polling job created: {:?} every {}s via {}",
        job.symbols,
        job.interval_secs,
        job.provider
    );

    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse::from(&job))))
}

/// Get a polling job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}",
    tag = "Jobs",
    params(
        ("job_id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = PollingJob),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
pub async fn get_job(
    State(state): State<ApiState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<PollingJob>, ApiError> {
    state
        .jobs
        .find_by_id(job_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))
}

/// Fetch, store and return the latest price for a symbol
#[utoipa::path(
    get,
    path = "/api/v1/prices/latest",
    tag = "Prices",
    params(LatestPriceQuery),
    responses(
        (status = 200, description = "Latest price", body = PriceResponse),
        (status = 400, description = "Unknown provider", body = ErrorResponse),
        (status = 404, description = "No data for symbol", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse)
    )
)]
pub async fn get_latest_price(
    State(state): State<ApiState>,
    Query(params): Query<LatestPriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    let symbol = params.symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }

    let provider = parse_provider(params.provider.as_deref())?;
    let point = state.executor.fetch_now(symbol, provider).await?;

    Ok(Json(PriceResponse::from(point)))
}

/// Get the stored moving average for a symbol
#[utoipa::path(
    get,
    path = "/api/v1/averages/{symbol}",
    tag = "Prices",
    params(
        ("symbol" = String, Path, description = "Symbol (e.g., AAPL)")
    ),
    responses(
        (status = 200, description = "Moving average", body = SymbolAverage),
        (status = 404, description = "No average yet", body = ErrorResponse)
    )
)]
pub async fn get_moving_average(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolAverage>, ApiError> {
    state
        .averages
        .find(&symbol)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No moving average for symbol: {}", symbol)))
}
