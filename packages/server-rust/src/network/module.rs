//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows callers to learn the bound port (and
//! share the session store or executor) between `start()` and `serve()`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::config::NetworkConfig;
use super::handlers::{api_routes, AppState};
use super::middleware::build_http_layers;
use super::session::SessionStore;
use crate::openapi::{api_doc, API_DOCS_PATH, SWAGGER_UI_PATH};
use crate::service::worker::{HousekeepingWorker, SessionReaper};
use crate::service::{ContextExecutor, ProcessingService, ServerConfig};

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (session store, executor)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    server_config: ServerConfig,
    listener: Option<TcpListener>,
    sessions: Arc<SessionStore>,
    executor: Arc<ContextExecutor>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    ///
    /// The session store and executor are allocated immediately; executor
    /// threads start lazily with the first submitted task.
    #[must_use]
    pub fn new(config: NetworkConfig, server_config: ServerConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(server_config.session_ttl));
        let executor = Arc::new(ContextExecutor::new(server_config.executor.clone()));
        Self {
            config,
            server_config,
            listener: None,
            sessions,
            executor,
        }
    }

    /// Returns a shared reference to the session store.
    #[must_use]
    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// Returns a shared reference to the context-propagating executor.
    #[must_use]
    pub fn executor(&self) -> Arc<ContextExecutor> {
        Arc::clone(&self.executor)
    }

    /// Assembles the axum router with all routes, API docs, and middleware.
    ///
    /// Routes:
    /// - `/api/*` -- the demo endpoints (see [`api_routes`])
    /// - `GET /v3/api-docs` -- OpenAPI document
    /// - `GET /swagger-ui` -- Swagger UI
    pub fn build_router(&self) -> Router {
        let state = AppState {
            processing: ProcessingService::new(Arc::clone(&self.executor)),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        let (router, api) = OpenApiRouter::with_openapi(api_doc(self.config.port))
            .nest("/api", api_routes())
            .split_for_parts();

        let layers = build_http_layers(&self.config, Arc::clone(&self.sessions));

        router
            .merge(SwaggerUi::new(SWAGGER_UI_PATH).url(API_DOCS_PATH, api))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.config.port = port;
        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. In-flight requests complete
    /// 2. The session reaper stops
    /// 3. The executor stops accepting tasks and drains its queue, waiting
    ///    up to `drain_timeout` for workers to exit
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// encounters a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        let mut reaper = HousekeepingWorker::spawn(
            SessionReaper::new(Arc::clone(&self.sessions)),
            self.server_config.session_reap_interval,
        );

        info!("Serving HTTP connections");
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        reaper.stop().await;
        drain_executor(Arc::clone(&self.executor), self.config.drain_timeout).await;

        served?;
        info!("Server stopped");
        Ok(())
    }
}

/// Stops the executor and waits for queued tasks to finish.
async fn drain_executor(executor: Arc<ContextExecutor>, timeout: Duration) {
    executor.shutdown();
    let terminated = tokio::task::spawn_blocking(move || executor.await_termination(timeout))
        .await
        .unwrap_or(false);
    if terminated {
        info!("Executor drained successfully");
    } else {
        warn!("Executor drain timeout expired with tasks remaining");
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::{SET_COOKIE, USER_AGENT};
    use axum::http::{HeaderMap, Request, StatusCode};
    use axum::routing::get;
    use reqctx_core::store;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    use super::*;
    use crate::error::UNEXPECTED_FAILURE;
    use crate::network::request_context::{
        ANONYMOUS_USER, FORWARDED_FOR_HEADER, REQUEST_ID_HEADER, USER_ID_HEADER,
    };
    use crate::service::ExecutorConfig;

    fn module() -> NetworkModule {
        let server_config = ServerConfig {
            executor: ExecutorConfig {
                core_pool_size: 2,
                max_pool_size: 4,
                queue_capacity: 8,
                thread_name_prefix: "test-module-".to_string(),
                ..ExecutorConfig::default()
            },
            ..ServerConfig::default()
        };
        NetworkModule::new(
            NetworkConfig {
                port: 0,
                ..NetworkConfig::default()
            },
            server_config,
        )
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn request_id(headers: &HeaderMap) -> String {
        headers[REQUEST_ID_HEADER].to_str().unwrap().to_string()
    }

    async fn context_info(request: Request<Body>) -> (HeaderMap, serde_json::Value) {
        let (status, headers, body) = send(module().build_router(), request).await;
        assert_eq!(status, StatusCode::OK);
        (headers, serde_json::from_str(&body).unwrap())
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module();
        assert!(module.listener.is_none());
    }

    #[test]
    fn shared_handles_return_same_arc() {
        let module = module();
        assert!(Arc::ptr_eq(&module.sessions(), &module.sessions()));
        assert!(Arc::ptr_eq(&module.executor(), &module.executor()));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let result = module().serve(std::future::pending::<()>()).await;
        let error = result.unwrap_err();
        assert!(error.to_string().contains("start() must be called"));
    }

    #[tokio::test]
    async fn hello_and_health() {
        let router = module().build_router();
        let (status, _, body) = send(router.clone(), get_request("/api/hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.is_empty());

        let (status, _, body) = send(router, get_request("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Application is running successfully!");
    }

    #[tokio::test]
    async fn anonymous_request_context() {
        let (headers, info) = context_info(get_request("/api/context-info")).await;
        assert_eq!(info["userId"], ANONYMOUS_USER);
        assert_eq!(info["requestId"], request_id(&headers));
        assert_eq!(info["fullContext"]["clientIp"], "unknown");
        assert_eq!(info["fullContext"]["userAgent"], "unknown");
        assert!(info["fullContext"]["sessionId"].is_string());
        assert!(store::is_empty());
    }

    #[tokio::test]
    async fn request_ids_differ_between_requests() {
        let router = module().build_router();
        let (_, first, _) = send(router.clone(), get_request("/api/hello")).await;
        let (_, second, _) = send(router, get_request("/api/hello")).await;
        assert_ne!(request_id(&first), request_id(&second));
    }

    #[tokio::test]
    async fn forwarded_for_and_user_agent() {
        let long_agent = "A".repeat(80);
        let request = Request::builder()
            .uri("/api/context-info")
            .header(FORWARDED_FOR_HEADER, "1.2.3.4, 5.6.7.8")
            .header(USER_AGENT, long_agent.as_str())
            .header(USER_ID_HEADER, "jane.smith")
            .body(Body::empty())
            .unwrap();
        let (_, info) = context_info(request).await;

        assert_eq!(info["userId"], "jane.smith");
        assert_eq!(info["fullContext"]["clientIp"], "1.2.3.4");
        let agent = info["fullContext"]["userAgent"].as_str().unwrap();
        assert_eq!(agent.len(), 53);
        assert!(agent.starts_with(&long_agent[..50]));
    }

    #[tokio::test]
    async fn user_processing_end_to_end() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/user/jane.smith/process")
            .header(USER_ID_HEADER, "jane.smith")
            .body(Body::from("test data"))
            .unwrap();
        let (status, _, body) = send(module().build_router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Processed data for user: jane.smith");
        assert!(store::is_empty());
    }

    #[tokio::test]
    async fn process_and_async_process() {
        let router = module().build_router();
        let (_, _, body) = send(router.clone(), get_request("/api/process?input=abc")).await;
        assert_eq!(body, "ABC");

        let (status, _, body) = send(router, get_request("/api/async-process")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Async result for: async-test");
    }

    #[tokio::test]
    async fn demo_endpoints() {
        let router = module().build_router();
        let (status, _, _) = send(router.clone(), get_request("/api/demo-logs")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, headers, body) = send(router, get_request("/api/demo-mdc")).await;
        assert_eq!(status, StatusCode::OK);
        let context: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(context["requestId"], request_id(&headers));
        assert!(context.get("businessProcess").is_none());
        assert!(context.get("module").is_none());
    }

    #[tokio::test]
    async fn validated_processing() {
        let router = module().build_router();
        let valid = Request::builder()
            .method("POST")
            .uri("/api/process-validated")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"data":"hello"}"#))
            .unwrap();
        let (status, _, body) = send(router.clone(), valid).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "HELLO");

        let blank = Request::builder()
            .method("POST")
            .uri("/api/process-validated")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"data":"  "}"#))
            .unwrap();
        let (status, headers, body) = send(router.clone(), blank).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["errors"]["data"], "Data cannot be blank");
        assert_eq!(json["requestId"], request_id(&headers));
        assert_eq!(json["status"], 400);

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/process-validated")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(router, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["errors"]["body"].is_string());
    }

    #[tokio::test]
    async fn simulate_error_names_request_id() {
        let router = module().build_router();
        let request = Request::builder()
            .method("POST")
            .uri("/api/simulate-error?throwError=true")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(router.clone(), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.ends_with(&request_id(&headers)));

        let request = Request::builder()
            .method("POST")
            .uri("/api/simulate-error")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "No error occurred");
    }

    #[tokio::test]
    async fn handler_panic_maps_to_unexpected_error_with_request_id() {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let router = Router::new()
            .route("/boom", get(|| async {
                panic!("handler exploded");
                #[allow(unreachable_code)]
                ()
            }))
            .layer(build_http_layers(&NetworkConfig::default(), sessions));

        let (status, headers, body) = send(router, get_request("/boom")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["message"], UNEXPECTED_FAILURE);
        assert_eq!(json["requestId"], request_id(&headers));
        assert!(!body.contains("exploded"));
        assert!(store::is_empty());
    }

    #[tokio::test]
    async fn new_session_sets_cookie() {
        let (_, headers, _) = send(module().build_router(), get_request("/api/hello")).await;
        let cookie = headers[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("SESSION="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn api_docs_list_routes_and_tags() {
        let (status, _, body) = send(module().build_router(), get_request(API_DOCS_PATH)).await;
        assert_eq!(status, StatusCode::OK);
        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/api/hello",
            "/api/health",
            "/api/process",
            "/api/demo-logs",
            "/api/demo-mdc",
            "/api/user/{userId}/process",
            "/api/async-process",
            "/api/context-info",
            "/api/simulate-error",
            "/api/process-validated",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc["tags"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn serve_reports_peer_address_and_shuts_down() {
        let mut module = module();
        let port = module.start().await.unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async {
            let _ = stop_rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(
                b"GET /api/context-info HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.contains(r#""clientIp":"127.0.0.1""#));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
