//! Carrying context into deferred work.
//!
//! The submitter's context is snapshotted when the work is wrapped, not when
//! it runs. The work then sees a copy of that snapshot on whatever thread
//! executes it, and the executing thread gets its own prior content back once
//! the work finishes or unwinds. Neither side can observe the other's later
//! mutations.

use std::future::Future;

use crate::context;
use crate::store::{ContextGuard, ContextSnapshot, WithContext};

/// Wraps `work` so that it runs with the caller's current context.
///
/// If the caller's context is empty the work runs with an empty context.
pub fn decorate<F, T>(work: F) -> impl FnOnce() -> T + Send + 'static
where
    F: FnOnce() -> T + Send + 'static,
    T: 'static,
{
    decorate_with(context::snapshot(), work)
}

/// Wraps `work` so that it runs with `snapshot` installed.
pub fn decorate_with<F, T>(
    snapshot: Option<ContextSnapshot>,
    work: F,
) -> impl FnOnce() -> T + Send + 'static
where
    F: FnOnce() -> T + Send + 'static,
    T: 'static,
{
    move || {
        let context = snapshot.map(ContextSnapshot::into_map).unwrap_or_default();
        let _guard = ContextGuard::install(context);
        work()
    }
}

/// Extension methods for running futures under a captured context.
pub trait ContextFutureExt: Future + Sized {
    /// Snapshots the caller's context now and installs it around every poll.
    fn in_current_context(self) -> WithContext<Self> {
        let snapshot = context::snapshot().unwrap_or_default();
        WithContext::new(snapshot.into_map(), self)
    }

    /// Installs `snapshot` around every poll.
    fn in_context(self, snapshot: ContextSnapshot) -> WithContext<Self> {
        WithContext::new(snapshot.into_map(), self)
    }
}

impl<F: Future> ContextFutureExt for F {}
