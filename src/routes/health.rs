use axum::{extract::State, http::StatusCode};

use crate::common::AppState;
use crate::error::{AppError, AppResult};

/// Health check endpoint
///
/// Returns 200 OK when the service and its database are reachable.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database unreachable"),
    ),
    tag = "health"
)]
pub async fn healthz(State(state): State<AppState>) -> AppResult<StatusCode> {
    state
        .db
        .ping()
        .await
        .map_err(|e| AppError::ServiceUnavailable(format!("Database unreachable: {e}")))?;
    Ok(StatusCode::OK)
}
