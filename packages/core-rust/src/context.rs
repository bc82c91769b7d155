//! Context manager: the programmatic API over the per-thread context store.
//!
//! Missing keys are a normal, observable state and never an error. Scoped
//! mutations save the prior value of every key they touch and put it back on
//! exit (normal return or unwinding), so nested scopes on different keys
//! compose.

use uuid::Uuid;

use crate::store::{self, ContextGuard, ContextSnapshot};

/// Well-known context keys.
pub mod keys {
    /// Unique per inbound request, generated at ingress.
    pub const REQUEST_ID: &str = "requestId";
    /// Caller identity, `anonymous` when the request carries none.
    pub const USER_ID: &str = "userId";
    pub const SESSION_ID: &str = "sessionId";
    pub const CLIENT_IP: &str = "clientIp";
    pub const USER_AGENT: &str = "userAgent";
    /// Business-operation-scoped correlation id.
    pub const TRANSACTION_ID: &str = "transactionId";
    /// Label of the business operation in progress.
    pub const OPERATION: &str = "operation";

    /// Keys whose lifetime matches one inbound request.
    pub const REQUEST_SCOPED: [&str; 5] = [REQUEST_ID, USER_ID, SESSION_ID, CLIENT_IP, USER_AGENT];
    /// Keys whose lifetime matches one business operation inside a request.
    pub const BUSINESS_SCOPED: [&str; 2] = [TRANSACTION_ID, OPERATION];
}

/// Length of generated transaction identifiers.
pub const TRANSACTION_ID_LEN: usize = 8;

/// Returns the value stored under `key`.
#[must_use]
pub fn get(key: &str) -> Option<String> {
    store::read(|map| map.get(key).cloned())
}

/// Stores `value` under `key`, overwriting any previous value.
pub fn set(key: impl Into<String>, value: impl Into<String>) {
    let (key, value) = (key.into(), value.into());
    store::write(|map| map.insert(key, value));
}

/// Removes `key`, returning its previous value.
pub fn remove(key: &str) -> Option<String> {
    store::write(|map| map.remove(key))
}

/// Removes every entry from the current store.
pub fn clear() {
    store::write(std::collections::BTreeMap::clear);
}

#[must_use]
pub fn request_id() -> Option<String> {
    get(keys::REQUEST_ID)
}

#[must_use]
pub fn user_id() -> Option<String> {
    get(keys::USER_ID)
}

pub fn set_transaction_id(transaction_id: impl Into<String>) {
    let transaction_id = transaction_id.into();
    tracing::debug!(transaction_id = %transaction_id, "Transaction id set");
    set(keys::TRANSACTION_ID, transaction_id);
}

/// Generates a short transaction id, stores it, and returns it.
///
/// The id is the first 8 hex digits of a random UUID. It is a correlation
/// aid for humans reading logs: collisions are unlikely but not checked.
pub fn generate_and_set_transaction_id() -> String {
    let mut transaction_id = Uuid::new_v4().simple().to_string();
    transaction_id.truncate(TRANSACTION_ID_LEN);
    set_transaction_id(transaction_id.clone());
    transaction_id
}

pub fn set_operation(operation: impl Into<String>) {
    let operation = operation.into();
    tracing::debug!(operation = %operation, "Operation set");
    set(keys::OPERATION, operation);
}

/// Removes `transactionId` and `operation`, leaving request-scoped keys alone.
///
/// Idempotent.
pub fn clear_business_context() {
    store::write(|map| {
        for key in keys::BUSINESS_SCOPED {
            map.remove(key);
        }
    });
    tracing::debug!("Business context cleared");
}

/// Runs `body` with `key` temporarily set to `value`.
///
/// Afterwards `key` holds its prior value again, or is absent if it was
/// absent before.
pub fn with_scoped_value<R>(
    key: impl Into<String>,
    value: impl Into<String>,
    body: impl FnOnce() -> R,
) -> R {
    with_scoped_values([(key, value)], body)
}

/// Runs `body` with every pair in `entries` temporarily set.
///
/// Restoration is per key, exactly like [`with_scoped_value`]: each key in
/// `entries` gets its prior value back (or is removed), while keys that
/// `body` added or changed outside `entries` are kept.
pub fn with_scoped_values<I, K, V, R>(entries: I, body: impl FnOnce() -> R) -> R
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let _restore = ScopedRestore::apply(entries);
    body()
}

/// Saved prior values of the keys touched by a scoped mutation.
struct ScopedRestore {
    saved: Vec<(String, Option<String>)>,
}

impl ScopedRestore {
    fn apply<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let saved = store::write(|map| {
            entries
                .into_iter()
                .map(|(key, value)| {
                    let prior = map.insert(key.clone(), value);
                    (key, prior)
                })
                .collect()
        });
        Self { saved }
    }
}

impl Drop for ScopedRestore {
    fn drop(&mut self) {
        let saved = std::mem::take(&mut self.saved);
        // Reverse order so a key listed twice ends up with its original value.
        store::write(|map| {
            for (key, prior) in saved.into_iter().rev() {
                match prior {
                    Some(value) => map.insert(key, value),
                    None => map.remove(&key),
                };
            }
        });
    }
}

/// Returns a copy of the current context, or `None` if it is empty.
#[must_use]
pub fn snapshot() -> Option<ContextSnapshot> {
    store::read(|map| (!map.is_empty()).then(|| ContextSnapshot::from(map.clone())))
}

/// Installs `snapshot` as the current context until the guard is dropped.
pub fn install(snapshot: ContextSnapshot) -> ContextGuard {
    ContextGuard::install(snapshot.into_map())
}

/// Logs the current context at DEBUG level.
pub fn log_current_context() {
    match snapshot() {
        Some(snapshot) => tracing::debug!(context = %snapshot, "Current context"),
        None => tracing::debug!("Context is empty"),
    }
}

// ---------------------------------------------------------------------------
// BusinessScope
// ---------------------------------------------------------------------------

/// RAII marker for one business operation.
///
/// Sets `operation`, generates a fresh `transactionId`, and clears both when
/// dropped, whatever way the operation ends.
#[derive(Debug)]
#[must_use = "the business context is cleared as soon as the scope is dropped"]
pub struct BusinessScope {
    transaction_id: String,
}

impl BusinessScope {
    pub fn begin(operation: impl Into<String>) -> Self {
        set_operation(operation);
        let transaction_id = generate_and_set_transaction_id();
        Self { transaction_id }
    }

    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

impl Drop for BusinessScope {
    fn drop(&mut self) {
        clear_business_context();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
