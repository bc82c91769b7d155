//! Logging demonstration endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};
use utoipa::IntoParams;

use super::dto::{ErrorResponse, ProcessRequest, ValidationErrorResponse};
use super::AppState;
use crate::error::ApiError;

pub const DEFAULT_PROCESS_INPUT: &str = "test";
pub const DEMO_LOGS_MESSAGE: &str = "Check the logs to see different log levels in action!";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProcessQuery {
    /// Text to process. Defaults to `test`.
    pub input: Option<String>,
}

/// Upper-cases `input` through the processing service.
#[utoipa::path(
    get,
    path = "/process",
    tag = "Logging Demonstration",
    summary = "Process input data",
    params(ProcessQuery),
    responses((status = 200, description = "Processed text or `Invalid input`", body = String, content_type = "text/plain"))
)]
pub async fn process(State(state): State<AppState>, Query(query): Query<ProcessQuery>) -> String {
    let input = query
        .input
        .unwrap_or_else(|| DEFAULT_PROCESS_INPUT.to_string());
    info!(input = %input, "Received request for /api/process endpoint");
    let result = state.processing.process_data(&input);
    debug!(result = %result, "Processing completed");
    result
}

/// Emits one log line per level.
#[utoipa::path(
    get,
    path = "/demo-logs",
    tag = "Logging Demonstration",
    summary = "Demonstrate log levels",
    responses((status = 200, description = "Hint to check the logs", body = String, content_type = "text/plain"))
)]
pub async fn demo_logs(State(state): State<AppState>) -> &'static str {
    info!("Received request for /api/demo-logs endpoint");
    state.processing.demonstrate_logging();
    DEMO_LOGS_MESSAGE
}

/// Processes a JSON body after checking its constraints.
#[utoipa::path(
    post,
    path = "/process-validated",
    tag = "Logging Demonstration",
    summary = "Process validated data",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Processed text", body = String, content_type = "text/plain"),
        (status = 400, description = "Constraint violation or malformed body", body = ValidationErrorResponse),
        (status = 500, description = "Processing failed", body = ErrorResponse)
    )
)]
pub async fn process_validated(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(request) = payload?;
    info!(request = ?request, "Received validated process request");
    request
        .validate()
        .map_err(|errors| ApiError::Validation { errors })?;

    let result = state.processing.process_data(&request.data);
    debug!(result = %result, "Validated processing completed");
    Ok(result)
}
