//! Asynchronous processing on the context-propagating executor.

use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use super::dto::ErrorResponse;
use super::AppState;
use crate::error::ApiError;

pub const DEFAULT_ASYNC_INPUT: &str = "async-test";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AsyncQuery {
    /// Text to process. Defaults to `async-test`.
    pub input: Option<String>,
}

/// Runs the work on a pool thread; its log lines carry this request's context.
#[utoipa::path(
    get,
    path = "/async-process",
    tag = "Async Processing",
    summary = "Process data asynchronously",
    params(AsyncQuery),
    responses(
        (status = 200, description = "Result computed on a worker", body = String, content_type = "text/plain"),
        (status = 500, description = "Worker pool failure", body = ErrorResponse)
    )
)]
pub async fn async_process(
    State(state): State<AppState>,
    Query(query): Query<AsyncQuery>,
) -> Result<String, ApiError> {
    let input = query
        .input
        .unwrap_or_else(|| DEFAULT_ASYNC_INPUT.to_string());
    info!(input = %input, "Received request for async processing");
    let result = state.processing.process_data_async(&input).await?;
    info!("Async processing completed in handler");
    Ok(result)
}
