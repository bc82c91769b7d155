//! Networking types, configuration, request context boundary, and server lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod request_context;
pub mod session;

pub use config::*;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use request_context::{RequestContextLayer, RequestContextService};
pub use session::{SessionHandle, SessionStore, SESSION_COOKIE};
