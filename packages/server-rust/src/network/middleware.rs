//! The tower stack wrapped around the router.
//!
//! Layers are listed outermost first. The request context interceptor sits
//! outside everything else so every log line and every response, including
//! timeouts and caught panics, belongs to a request.

use std::any::Any;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyHeaders, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::config::NetworkConfig;
use super::request_context::RequestContextLayer;
use super::session::SessionStore;
use crate::error::ApiError;

/// Handler invoked by [`CatchPanicLayer`] when a route panics.
type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Concrete type of [`build_http_layers`]; the innermost layer is listed first.
type HttpLayers = tower::layer::util::Stack<
    CatchPanicLayer<PanicHandler>,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                TraceLayer<
                    tower_http::classify::SharedClassifier<
                        tower_http::classify::ServerErrorsAsFailures,
                    >,
                >,
                tower::layer::util::Stack<RequestContextLayer, tower::layer::util::Identity>,
            >,
        >,
    >,
>;

/// Middleware for every route, outermost to innermost:
///
/// 1. request context (context store, `X-Request-Id`, session cookie)
/// 2. HTTP trace spans
/// 3. CORS for `config.cors_origins`
/// 4. request timeout, answered with `408 Request Timeout`
/// 5. panic recovery, answered with the unclassified error body
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, sessions: Arc<SessionStore>) -> HttpLayers {
    ServiceBuilder::new()
        .layer(RequestContextLayer::new(sessions))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(CatchPanicLayer::custom(panic_response as PanicHandler))
        .into_inner()
}

/// `"*"` anywhere in `origins` admits every origin; otherwise only the
/// entries that parse as header values are admitted.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AnyHeaders)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(panic = detail, "Handler panicked");
    ApiError::Unclassified(detail.to_string()).into_response()
}
