use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::common::AppState;
use crate::engine::CommandRequest;
use crate::error::AppResult;

use super::types::{CommandResponse, OutcomeReport, SubmitCommand};

/// Submit an actuator command
///
/// The command is validated against the actuator, stored as `queued` and
/// delivered in the background.
#[utoipa::path(
    post,
    path = "/api/commands",
    request_body = SubmitCommand,
    responses(
        (status = 202, description = "Command queued", body = CommandResponse),
        (status = 400, description = "Command not valid for this actuator"),
    ),
    tag = "commands"
)]
pub async fn submit_command(
    State(state): State<AppState>,
    Json(input): Json<SubmitCommand>,
) -> AppResult<(StatusCode, Json<CommandResponse>)> {
    let request = CommandRequest {
        actuator_id: input.actuator_id,
        name: input.name,
        args: input.args.clone(),
        issued_by: input.issued_by,
        rule_id: None,
        alert_id: None,
    };
    let command = state.dispatcher.dispatch(&request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse::new(command, input.args)),
    ))
}

/// Get a command with its arguments
#[utoipa::path(
    get,
    path = "/api/commands/{command_id}",
    params(
        ("command_id" = Uuid, Path, description = "Command UUID"),
    ),
    responses(
        (status = 200, description = "Command retrieved successfully", body = CommandResponse),
        (status = 404, description = "Command not found"),
    ),
    tag = "commands"
)]
pub async fn get_command(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
) -> AppResult<Json<CommandResponse>> {
    let (command, args) = state.dispatcher.load(command_id).await?;
    Ok(Json(CommandResponse::new(command, args)))
}

/// Report the outcome of a sent command
///
/// Used by gateways that accept commands asynchronously.
#[utoipa::path(
    post,
    path = "/api/commands/{command_id}/outcome",
    params(
        ("command_id" = Uuid, Path, description = "Command UUID"),
    ),
    request_body = OutcomeReport,
    responses(
        (status = 200, description = "Outcome recorded", body = CommandResponse),
        (status = 404, description = "Command not found"),
        (status = 409, description = "Command is not awaiting an outcome"),
    ),
    tag = "commands"
)]
pub async fn record_outcome(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    Json(report): Json<OutcomeReport>,
) -> AppResult<Json<CommandResponse>> {
    let outcome = if report.success {
        Ok(())
    } else {
        Err(report
            .error
            .unwrap_or_else(|| "gateway reported failure".to_string()))
    };
    state.dispatcher.record_outcome(command_id, outcome).await?;

    let (command, args) = state.dispatcher.load(command_id).await?;
    Ok(Json(CommandResponse::new(command, args)))
}
