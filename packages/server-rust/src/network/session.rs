//! Cookie-backed session registry.
//!
//! Supplies the `sessionId` context field. A request presenting a known,
//! unexpired `SESSION` cookie keeps its session; any other request gets a
//! fresh one and the response sets the cookie.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::header::COOKIE;
use http::HeaderMap;
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "SESSION";

/// Result of resolving the session for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    /// `true` if the session was created for this request.
    pub created: bool,
}

impl SessionHandle {
    /// `Set-Cookie` value announcing this session to the client.
    #[must_use]
    pub fn set_cookie_value(&self) -> String {
        format!("{SESSION_COOKIE}={}; Path=/; HttpOnly", self.id)
    }
}

/// Concurrent registry of live sessions keyed by id, holding last access time.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Instant>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Resolves the session for a request presenting `presented` as its cookie.
    pub fn resolve(&self, presented: Option<&str>) -> SessionHandle {
        let now = Instant::now();
        if let Some(id) = presented {
            if let Some(mut last_access) = self.sessions.get_mut(id) {
                if now.duration_since(*last_access) <= self.ttl {
                    *last_access = now;
                    return SessionHandle {
                        id: id.to_string(),
                        created: false,
                    };
                }
            }
        }

        let id = Uuid::new_v4().simple().to_string().to_uppercase();
        self.sessions.insert(id.clone(), now);
        SessionHandle { id, created: true }
    }

    /// Drops sessions idle longer than the TTL. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, last_access| now.duration_since(*last_access) <= self.ttl);
        before.saturating_sub(self.sessions.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Extracts the session id from the request's `Cookie` headers.
#[must_use]
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn unknown_cookie_creates_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let handle = store.resolve(Some("forged"));
        assert!(handle.created);
        assert_ne!(handle.id, "forged");
        assert_eq!(handle.id.len(), 32);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn known_cookie_reuses_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let first = store.resolve(None);
        let second = store.resolve(Some(&first.id));
        assert!(!second.created);
        assert_eq!(second.id, first.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_session_is_replaced_and_purged() {
        let store = SessionStore::new(Duration::ZERO);
        let first = store.resolve(None);
        std::thread::sleep(Duration::from_millis(5));
        let second = store.resolve(Some(&first.id));
        assert!(second.created);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn session_cookie_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("lang=en; SESSION=ABC123 ; x=y"));
        assert_eq!(session_cookie(&headers), Some("ABC123"));
    }

    #[test]
    fn session_cookie_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("SESSION=; other=1"));
        assert_eq!(session_cookie(&headers), None);
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[test]
    fn set_cookie_value_format() {
        let handle = SessionHandle {
            id: "ABC".to_string(),
            created: true,
        };
        assert_eq!(handle.set_cookie_value(), "SESSION=ABC; Path=/; HttpOnly");
    }
}
