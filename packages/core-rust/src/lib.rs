//! `reqctx` core: per-request diagnostic context, its manager API, and propagation
//! of context into deferred work.

pub mod context;
pub mod propagation;
pub mod store;

pub use context::{keys, BusinessScope};
pub use propagation::{decorate, decorate_with, ContextFutureExt};
pub use store::{ContextGuard, ContextMap, ContextSnapshot, WithContext};
