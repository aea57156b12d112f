use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::responses::*;
use crate::database::models::{PollingJob, SymbolAverage};
use crate::provider::ProviderKind;

/// OpenAPI v1 document
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Price Pipeline API",
        version = "1.0.0",
        description = "Polling jobs, on-demand prices and moving averages"
    ),
    paths(
        handlers::health_check,
        handlers::create_job,
        handlers::get_job,
        handlers::get_latest_price,
        handlers::get_moving_average,
    ),
    components(
        schemas(
            PollingJob,
            SymbolAverage,
            ProviderKind,
            CreateJobRequest,
            CreateJobResponse,
            JobConfigResponse,
            PriceResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Jobs", description = "Polling job endpoints"),
        (name = "Prices", description = "Price and moving average endpoints"),
    )
)]
pub struct ApiDocV1;
