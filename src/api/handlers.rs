use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::responses::{ErrorResponse, HealthResponse};
use crate::jobs::{FetchOutcome, InvocationError, RecurringTaskTrigger};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub trigger: Arc<RecurringTaskTrigger>,
}

/// API error wrapper for whole-invocation failures
pub struct ApiError(InvocationError);

impl From<InvocationError> for ApiError {
    fn from(err: InvocationError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            InvocationError::AlreadyRunning => (StatusCode::CONFLICT, "already_running"),
            InvocationError::RetriesExhausted { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "retries_exhausted")
            }
            InvocationError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            InvocationError::TimedOut(_) => (StatusCode::GATEWAY_TIMEOUT, "timed_out"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        trigger_state: state.trigger.state(),
        instruments: state.trigger.instruments().to_vec(),
    })
}

/// Run one fetch cycle now
#[utoipa::path(
    post,
    path = "/api/v1/fetch/run",
    tag = "Fetch",
    responses(
        (status = 200, description = "Cycle finished; per-instrument results", body = FetchOutcome),
        (status = 409, description = "A cycle is already running", body = ErrorResponse),
        (status = 503, description = "All attempts failed", body = ErrorResponse)
    )
)]
pub async fn run_fetch_cycle(
    State(state): State<AppState>,
) -> Result<Json<FetchOutcome>, ApiError> {
    tracing::info!("Manual fetch cycle requested");

    let outcome = state.trigger.run_fetch_cycle().await?;
    Ok(Json(outcome))
}
