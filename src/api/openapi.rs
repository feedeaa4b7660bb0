use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::responses::*;
use crate::jobs::{FetchOutcome, TriggerState};

/// OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Index Price Collector",
        version = "0.1.0",
        description = "Periodically fetches index prices and stores them in PostgreSQL",
        license(
            name = "MIT"
        )
    ),
    paths(
        handlers::health_check,
        handlers::run_fetch_cycle,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            FetchOutcome,
            TriggerState,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Fetch", description = "Manual fetch cycle control"),
    )
)]
pub struct ApiDoc;
