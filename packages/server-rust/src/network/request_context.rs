//! Request boundary interceptor.
//!
//! `RequestContextLayer` is the outermost layer of the HTTP stack. For every
//! request it populates the context store with the request-scoped fields,
//! delegates to the router with that context installed, and drops the
//! context when the response future completes or is dropped.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::ConnectInfo;
use http::header::{SET_COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use reqctx_core::{context, keys, ContextGuard, ContextMap, WithContext};
use tower::{Layer, Service};
use tracing::{info, warn};
use uuid::Uuid;

use super::session::{session_cookie, SessionStore};

/// Identity header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";
/// Response header echoing the generated request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `userId` for requests without an identity header.
pub const ANONYMOUS_USER: &str = "anonymous";
/// Stored when a value cannot be derived from the request.
pub const UNKNOWN: &str = "unknown";
/// Longest user agent stored verbatim, in characters.
pub const USER_AGENT_MAX_CHARS: usize = 50;
pub const TRUNCATION_MARKER: &str = "...";

// ---------------------------------------------------------------------------
// Field derivation
// ---------------------------------------------------------------------------

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Resolves the originating client address.
///
/// First match wins: the first `X-Forwarded-For` entry, then `X-Real-IP`
/// verbatim, then the transport peer, then `unknown`.
#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, FORWARDED_FOR_HEADER) {
        let first = forwarded.split(',').next().unwrap_or(forwarded);
        return first.trim().to_string();
    }
    if let Some(real_ip) = header_str(headers, REAL_IP_HEADER) {
        return real_ip.to_string();
    }
    peer.map_or_else(|| UNKNOWN.to_string(), |addr| addr.ip().to_string())
}

/// Caps a user agent at [`USER_AGENT_MAX_CHARS`] characters, appending
/// [`TRUNCATION_MARKER`] when something was cut. Absent becomes `unknown`.
#[must_use]
pub fn truncate_user_agent(user_agent: Option<&str>) -> String {
    let Some(user_agent) = user_agent else {
        return UNKNOWN.to_string();
    };
    match user_agent.char_indices().nth(USER_AGENT_MAX_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &user_agent[..cut]),
        None => user_agent.to_string(),
    }
}

/// Builds the request-scoped context for one inbound request.
#[must_use]
pub fn request_context<B>(request: &Request<B>, session_id: &str) -> ContextMap {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    // Only a missing header falls back to anonymous; an empty one is kept.
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(ANONYMOUS_USER);
    let user_agent = headers.get(USER_AGENT).and_then(|value| value.to_str().ok());

    ContextMap::from([
        (keys::REQUEST_ID.to_string(), Uuid::new_v4().to_string()),
        (keys::USER_ID.to_string(), user_id.to_string()),
        (keys::SESSION_ID.to_string(), session_id.to_string()),
        (keys::CLIENT_IP.to_string(), resolve_client_ip(headers, peer)),
        (keys::USER_AGENT.to_string(), truncate_user_agent(user_agent)),
    ])
}

// ---------------------------------------------------------------------------
// RequestContextLayer
// ---------------------------------------------------------------------------

/// Tower layer that scopes the context store to each HTTP request.
#[derive(Debug, Clone)]
pub struct RequestContextLayer {
    sessions: Arc<SessionStore>,
}

impl RequestContextLayer {
    #[must_use]
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService {
            inner,
            sessions: Arc::clone(&self.sessions),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestContextService
// ---------------------------------------------------------------------------

/// Service wrapper installing the request context around the inner service.
#[derive(Debug, Clone)]
pub struct RequestContextService<S> {
    inner: S,
    sessions: Arc<SessionStore>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestContextService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let session = self.sessions.resolve(session_cookie(request.headers()));
        let fields = request_context(&request, &session.id);

        // Installed while the inner service builds its future so that
        // anything logged synchronously during routing carries the context.
        let guard = ContextGuard::install(fields);
        info!(method = %request.method(), path = %request.uri().path(), "Request started");
        let request_id = context::request_id().unwrap_or_default();
        let future = self.inner.call(request);
        let fields = guard.release();

        Box::pin(WithContext::new(fields, async move {
            let mut response = future.await?;
            info!(status = response.status().as_u16(), "Request completed");

            let headers = response.headers_mut();
            match HeaderValue::from_str(&request_id) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                }
                Err(e) => warn!(error = %e, "request id is not a valid header value"),
            }
            if session.created {
                if let Ok(value) = HeaderValue::from_str(&session.set_cookie_value()) {
                    headers.append(SET_COOKIE, value);
                }
            }
            Ok(response)
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
