//! Per-thread context store.
//!
//! Every thread owns one string-to-string map. Code running on that thread
//! reads and mutates it through [`crate::context`]. A logical unit of work
//! (one inbound request, one propagated background task) gets its own map by
//! installing it with a [`ContextGuard`] or by wrapping its future in
//! [`WithContext`]; in both cases the thread's previous content comes back
//! when the unit of work stops running on that thread.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};

/// Raw content of a context store.
///
/// Uses `BTreeMap` so snapshots and log output have a stable key order.
pub type ContextMap = BTreeMap<String, String>;

thread_local! {
    static STORE: RefCell<ContextMap> = const { RefCell::new(BTreeMap::new()) };
}

pub(crate) fn read<R>(f: impl FnOnce(&ContextMap) -> R) -> R {
    STORE.with_borrow(f)
}

pub(crate) fn write<R>(f: impl FnOnce(&mut ContextMap) -> R) -> R {
    STORE.with_borrow_mut(f)
}

/// Copies the current thread's store without ever panicking.
///
/// Returns `None` when the store is empty, currently borrowed, or already
/// destroyed (thread teardown). Log formatters use this so that emitting an
/// event can never fail because of the context machinery.
#[must_use]
pub fn try_snapshot() -> Option<ContextSnapshot> {
    STORE
        .try_with(|cell| {
            cell.try_borrow()
                .ok()
                .filter(|map| !map.is_empty())
                .map(|map| ContextSnapshot(map.clone()))
        })
        .ok()
        .flatten()
}

/// Removes and returns everything in the current thread's store.
pub fn take() -> ContextMap {
    write(std::mem::take)
}

/// Returns `true` if the current thread's store holds no entries.
#[must_use]
pub fn is_empty() -> bool {
    read(BTreeMap::is_empty)
}

// ---------------------------------------------------------------------------
// ContextSnapshot
// ---------------------------------------------------------------------------

/// Immutable point-in-time copy of a context store.
///
/// A snapshot is a plain value: changing the store after the snapshot was
/// taken does not affect it, and installing it somewhere else hands over a
/// copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSnapshot(ContextMap);

impl ContextSnapshot {
    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn as_map(&self) -> &ContextMap {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> ContextMap {
        self.0
    }
}

impl From<ContextMap> for ContextSnapshot {
    fn from(map: ContextMap) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ContextSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ContextGuard
// ---------------------------------------------------------------------------

/// RAII guard that installs a map into the current thread's store.
///
/// The previous content is restored when the guard is dropped, including
/// during unwinding. The guard is `!Send`: restoring on another thread would
/// corrupt that thread's store.
#[derive(Debug)]
#[must_use = "the context is removed again as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<ContextMap>,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Replaces the current thread's store with `map`.
    pub fn install(map: ContextMap) -> Self {
        let previous = STORE.with(|cell| cell.replace(map));
        Self {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }

    /// Installs an empty store, hiding whatever the thread held before.
    pub fn empty() -> Self {
        Self::install(ContextMap::new())
    }

    /// Restores the previous content and returns what was installed,
    /// including any mutation made while the guard was active.
    #[must_use]
    pub fn release(mut self) -> ContextMap {
        self.restore().unwrap_or_default()
    }

    fn restore(&mut self) -> Option<ContextMap> {
        let previous = self.previous.take()?;
        STORE.try_with(|cell| cell.replace(previous)).ok()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

// ---------------------------------------------------------------------------
// WithContext
// ---------------------------------------------------------------------------

/// Future wrapper that owns a context map for one unit of work.
///
/// The map is installed into whichever thread polls the future, for the
/// duration of each `poll`, and taken back out afterwards. When the future
/// completes or is dropped the map goes with it, so nothing the unit of work
/// wrote can be observed by the next unit of work on the same thread.
pub struct WithContext<F> {
    inner: Pin<Box<F>>,
    context: Option<ContextMap>,
}

impl<F> WithContext<F> {
    pub fn new(context: ContextMap, inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
            context: Some(context),
        }
    }

    /// The context the wrapped future will see on its next poll.
    ///
    /// `None` once the future has completed.
    #[must_use]
    pub fn context(&self) -> Option<&ContextMap> {
        self.context.as_ref()
    }
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let guard = ContextGuard::install(this.context.take().unwrap_or_default());
        let poll = this.inner.as_mut().poll(cx);
        let context = guard.release();
        if poll.is_pending() {
            this.context = Some(context);
        }
        poll
    }
}

impl<F> fmt::Debug for WithContext<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithContext")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
