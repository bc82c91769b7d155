//! HTTP handler definitions for the `reqctx` server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and the routes of the `/api` surface, each annotated for the
//! OpenAPI document.

pub mod async_process;
pub mod context;
pub mod dto;
pub mod health;
pub mod logging;
pub mod simulate_error;

use std::sync::Arc;
use std::time::Instant;

use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use super::NetworkConfig;
use crate::service::ProcessingService;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Business logic behind the processing endpoints.
    pub processing: ProcessingService,
    /// Network configuration (bind address, CORS, timeouts).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

/// Routes served under `/api`, with their OpenAPI operations.
pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(health::hello))
        .routes(routes!(health::health))
        .routes(routes!(logging::process))
        .routes(routes!(logging::demo_logs))
        .routes(routes!(logging::process_validated))
        .routes(routes!(context::demo_context))
        .routes(routes!(context::process_for_user))
        .routes(routes!(context::context_info))
        .routes(routes!(async_process::async_process))
        .routes(routes!(simulate_error::simulate_error))
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::service::executor::{ContextExecutor, ExecutorConfig};

    let executor = ContextExecutor::new(ExecutorConfig {
        core_pool_size: 2,
        max_pool_size: 4,
        queue_capacity: 8,
        thread_name_prefix: "test-handler-".to_string(),
        ..ExecutorConfig::default()
    });
    AppState {
        processing: ProcessingService::new(Arc::new(executor)),
        config: Arc::new(NetworkConfig::default()),
        start_time: Instant::now(),
    }
}
