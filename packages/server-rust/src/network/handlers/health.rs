//! Basic endpoints: greeting and health check.

use axum::extract::State;
use tracing::{debug, info};

use super::AppState;

pub const HELLO_MESSAGE: &str = "Hello from the request context demo!";
pub const HEALTHY_MESSAGE: &str = "Application is running successfully!";

/// Plain-text greeting.
#[utoipa::path(
    get,
    path = "/hello",
    tag = "Basic Operations",
    summary = "Get hello message",
    responses((status = 200, description = "Greeting", body = String, content_type = "text/plain"))
)]
pub async fn hello() -> &'static str {
    info!("Received request for /api/hello endpoint");
    debug!(response = HELLO_MESSAGE, "Returning response");
    HELLO_MESSAGE
}

/// Liveness check. Always 200 while the process serves requests.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Basic Operations",
    summary = "Health check",
    responses((status = 200, description = "Application is up", body = String, content_type = "text/plain"))
)]
pub async fn health(State(state): State<AppState>) -> &'static str {
    info!("Received request for /api/health endpoint");
    debug!(
        uptime_secs = state.start_time.elapsed().as_secs(),
        "Health check response"
    );
    HEALTHY_MESSAGE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::test_state;

    #[tokio::test]
    async fn hello_returns_greeting() {
        assert_eq!(hello().await, HELLO_MESSAGE);
    }

    #[tokio::test]
    async fn health_reports_running() {
        assert_eq!(health(State(test_state())).await, HEALTHY_MESSAGE);
    }
}
