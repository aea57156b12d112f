use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::*;
use super::openapi::ApiDocV1;

/// Create the API router with Swagger UI
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/v1/openapi.json", ApiDocV1::openapi()))
        .route("/health", get(health_check))
        // Polling jobs
        .route("/api/v1/jobs", post(create_job))
        .route("/api/v1/jobs/:job_id", get(get_job))
        // Prices
        .route("/api/v1/prices/latest", get(get_latest_price))
        .route("/api/v1/averages/:symbol", get(get_moving_average))
        .with_state(state)
}
