//! API documentation: the OpenAPI document and where it is served.

use utoipa::openapi::server::ServerBuilder;
use utoipa::OpenApi;

/// Path of the OpenAPI JSON document.
pub const API_DOCS_PATH: &str = "/v3/api-docs";
/// Path of the Swagger UI.
pub const SWAGGER_UI_PATH: &str = "/swagger-ui";

pub const PRODUCTION_SERVER: &str = "https://api.example.com";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Request Context Demo API",
        description = "Demonstrates request-scoped diagnostic context: every log line \
                       written while serving a request carries its request id, user, \
                       session and client details, including work that continues on \
                       a worker pool.",
        version = "1.0.0",
        contact(
            name = "reqctx maintainers",
            email = "dev@example.com",
            url = "https://github.com/reqctx/reqctx"
        ),
        license(name = "Apache-2.0", url = "https://www.apache.org/licenses/LICENSE-2.0")
    ),
    tags(
        (name = "Basic Operations", description = "Health checks and simple operations"),
        (name = "Logging Demonstration", description = "Log levels and context-enriched processing"),
        (name = "MDC Context Management", description = "Inspecting and scoping the request context"),
        (name = "Async Processing", description = "Context preserved across the worker pool"),
        (name = "Error Handling", description = "Error scenarios and their responses")
    )
)]
pub struct ApiDoc;

/// Base document with the local server on `port` and the production server.
#[must_use]
pub fn api_doc(port: u16) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![
        ServerBuilder::new()
            .url(format!("http://localhost:{port}"))
            .description(Some("Local development server"))
            .build(),
        ServerBuilder::new()
            .url(PRODUCTION_SERVER)
            .description(Some("Production server"))
            .build(),
    ]);
    doc
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use utoipa_axum::router::OpenApiRouter;

    use super::*;
    use crate::network::handlers::api_routes;

    #[test]
    fn every_operation_tag_is_declared_and_every_tag_used() {
        let (_, doc) = OpenApiRouter::with_openapi(api_doc(8080))
            .nest("/api", api_routes())
            .split_for_parts();

        let declared: BTreeSet<String> = doc
            .tags
            .iter()
            .flatten()
            .map(|tag| tag.name.clone())
            .collect();
        let used: BTreeSet<String> = doc
            .paths
            .paths
            .values()
            .flat_map(|item| [&item.get, &item.post])
            .flatten()
            .flat_map(|operation| operation.tags.iter().flatten().cloned())
            .collect();

        assert_eq!(declared.len(), 5);
        assert_eq!(used, declared);
    }

    #[test]
    fn servers_use_configured_port() {
        let doc = api_doc(9191);
        let servers = doc.servers.unwrap();
        assert_eq!(servers[0].url, "http://localhost:9191");
        assert_eq!(servers[1].url, PRODUCTION_SERVER);
    }

    #[test]
    fn info_is_populated() {
        let doc = api_doc(8080);
        assert_eq!(doc.info.version, "1.0.0");
        assert!(doc.info.contact.is_some());
        assert!(doc.info.license.is_some());
    }
}
