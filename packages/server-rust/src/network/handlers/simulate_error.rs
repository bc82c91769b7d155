//! Error simulation endpoint.

use axum::extract::Query;
use axum::http::StatusCode;
use reqctx_core::context;
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::IntoParams;

use super::dto::ABSENT;

pub const NO_ERROR_MESSAGE: &str = "No error occurred";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct SimulateErrorQuery {
    /// Fail the request when `true`.
    #[serde(default)]
    pub throw_error: bool,
}

/// Optionally fails, answering with the request id to look up in the logs.
#[utoipa::path(
    post,
    path = "/simulate-error",
    tag = "Error Handling",
    summary = "Simulate an error",
    params(SimulateErrorQuery),
    responses(
        (status = 200, description = "No error requested", body = String, content_type = "text/plain"),
        (status = 500, description = "Simulated failure naming the request id", body = String, content_type = "text/plain")
    )
)]
pub async fn simulate_error(Query(query): Query<SimulateErrorQuery>) -> (StatusCode, String) {
    info!(throw_error = query.throw_error, "Received request to simulate error");
    if !query.throw_error {
        info!("No error simulation requested");
        return (StatusCode::OK, NO_ERROR_MESSAGE.to_string());
    }

    warn!("About to raise simulated error");
    error!(error = "Simulated error for testing request context", "Simulated error occurred");
    let request_id = context::request_id().unwrap_or_else(|| ABSENT.to_string());
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Error occurred - check logs for details with request ID: {request_id}"),
    )
}
