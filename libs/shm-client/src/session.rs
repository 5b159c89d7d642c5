use chrono::Duration;
use std::sync::Arc;
use tracing::debug;

use crate::store::CookieStore;

pub const SESSION_COOKIE: &str = "session-id";
pub const SESSION_TTL_DAYS: i64 = 3;

/// Owner of the session credential and its sliding expiry.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn CookieStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }

    pub fn set(&self, token: &str) {
        self.set_for(token, Duration::days(SESSION_TTL_DAYS));
    }

    pub fn set_for(&self, token: &str, ttl: Duration) {
        self.store.set(SESSION_COOKIE, token, Some(ttl));
    }

    pub fn get(&self) -> Option<String> {
        self.store.get(SESSION_COOKIE)
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    pub fn clear(&self) {
        debug!("Clearing session credential");
        self.store.remove(SESSION_COOKIE);
    }

    /// Re-applies the current token with a fresh window. No-op without a token.
    pub fn touch(&self) {
        if let Some(token) = self.get() {
            self.set(&token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn session() -> (SessionStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SessionStore::new(store.clone()), store)
    }

    #[test]
    fn touch_keeps_token_and_slides_expiry() {
        let (session, store) = session();
        session.set_for("tok", Duration::minutes(5));
        let before = store.expires_at(SESSION_COOKIE).unwrap();

        for _ in 0..10 {
            session.touch();
        }

        assert_eq!(session.get().as_deref(), Some("tok"));
        let after = store.expires_at(SESSION_COOKIE).unwrap();
        assert!(after > before + Duration::days(2));
    }

    #[test]
    fn clear_removes_token() {
        let (session, _) = session();
        session.set("tok");
        session.clear();
        assert_eq!(session.get(), None);
    }

    #[test]
    fn touch_without_token_is_noop() {
        let (session, store) = session();
        session.touch();
        assert_eq!(session.get(), None);
        assert_eq!(store.expires_at(SESSION_COOKIE), None);
    }
}
