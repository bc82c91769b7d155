//! Context inspection and scoping endpoints.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use reqctx_core::context;
use tracing::{debug, info};

use super::dto::{epoch_millis, ContextInfoResponse, ABSENT};
use super::AppState;

/// Header naming the operation of a user-specific processing call.
pub const OPERATION_HEADER: &str = "x-operation";
pub const DEFAULT_OPERATION: &str = "userDataProcessing";
pub const TARGET_USER_KEY: &str = "targetUserId";
pub const DATA_SIZE_KEY: &str = "dataSize";

fn current_context() -> BTreeMap<String, String> {
    context::snapshot()
        .map(reqctx_core::ContextSnapshot::into_map)
        .unwrap_or_default()
}

/// Runs the scoping demonstration and returns the context afterwards.
#[utoipa::path(
    get,
    path = "/demo-mdc",
    tag = "MDC Context Management",
    summary = "Demonstrate context management",
    responses((status = 200, description = "Current context", body = BTreeMap<String, String>))
)]
pub async fn demo_context(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    info!("Received request for /api/demo-mdc endpoint");
    state.processing.demonstrate_context();
    let current = current_context();
    debug!(entries = current.len(), "Returning current context");
    Json(current)
}

/// Processes `data` on behalf of `user_id` with extra scoped context.
#[utoipa::path(
    post,
    path = "/user/{userId}/process",
    tag = "MDC Context Management",
    summary = "Process data for a user",
    params(
        ("userId" = String, Path, description = "User the data belongs to"),
        ("X-Operation" = Option<String>, Header, description = "Operation label, defaults to `userDataProcessing`")
    ),
    request_body(content = String, content_type = "text/plain"),
    responses((status = 200, description = "Confirmation", body = String, content_type = "text/plain"))
)]
pub async fn process_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    data: String,
) -> String {
    let operation = headers
        .get(OPERATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_OPERATION);
    info!(user_id = %user_id, operation, "Received request for user-specific processing");

    let scoped = [
        (TARGET_USER_KEY, user_id.clone()),
        (DATA_SIZE_KEY, data.chars().count().to_string()),
    ];
    context::with_scoped_values(scoped, || {
        context::set_operation(operation);
        info!("Processing data for specific user");
        let result = state.processing.process_data(&data);
        debug!(result = %result, "User-specific result");
        info!("User-specific processing completed");
    });

    format!("Processed data for user: {user_id}")
}

/// Returns the context as seen by this handler.
#[utoipa::path(
    get,
    path = "/context-info",
    tag = "MDC Context Management",
    summary = "Get context information",
    responses((status = 200, description = "Context snapshot", body = ContextInfoResponse))
)]
pub async fn context_info() -> Json<ContextInfoResponse> {
    info!("Received request for context information");
    let info = ContextInfoResponse {
        request_id: context::request_id().unwrap_or_else(|| ABSENT.to_string()),
        user_id: context::user_id().unwrap_or_else(|| ABSENT.to_string()),
        full_context: current_context(),
        timestamp: epoch_millis(),
    };
    debug!(?info, "Context info prepared");
    Json(info)
}
