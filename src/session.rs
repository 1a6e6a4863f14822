//! Session store
//!
//! Holds the access token and the minimal identity attached to outgoing
//! requests. The store is a cheap-to-clone handle; the token is replaced
//! atomically on refresh and cleared on logout or refresh failure.
//!
//! The token is only written through three paths: login, the refresh
//! coordinator's settle step, and logout. Everything else reads.
//!
//! When a refresh fails terminally the store is expired, which broadcasts
//! a session-ended signal; the composition root watches it to navigate
//! back to a login screen.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;

/// Minimal user descriptor attached to user-scoped requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Numeric user id, sent as the `X-User-Id` header
    pub user_id: i64,
    /// Display name used when publishing chat messages
    pub nickname: String,
}

struct SessionInner {
    token: RwLock<Option<String>>,
    identity: RwLock<Option<Identity>>,
    ended_tx: watch::Sender<bool>,
}

/// Shared handle to the current session state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                token: RwLock::new(None),
                identity: RwLock::new(None),
                ended_tx,
            }),
        }
    }

    /// Current access token, if any.
    pub fn token(&self) -> Option<String> {
        self.inner.token.read().expect("token lock poisoned").clone()
    }

    /// Replace the access token. Also re-arms the session-ended signal so a
    /// fresh login after an expiry starts clean.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        *self.inner.token.write().expect("token lock poisoned") = Some(token);
        self.inner.ended_tx.send_if_modified(|ended| {
            let was = *ended;
            *ended = false;
            was
        });
    }

    /// Current identity, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.inner
            .identity
            .read()
            .expect("identity lock poisoned")
            .clone()
    }

    /// Replace the identity (written on login, refresh and profile fetch).
    pub fn set_identity(&self, identity: Identity) {
        *self
            .inner
            .identity
            .write()
            .expect("identity lock poisoned") = Some(identity);
    }

    /// Drop token and identity without signalling (logout path).
    pub fn clear(&self) {
        *self.inner.token.write().expect("token lock poisoned") = None;
        *self
            .inner
            .identity
            .write()
            .expect("identity lock poisoned") = None;
    }

    /// Drop token and identity and broadcast the session-ended signal.
    /// Called by the refresh coordinator when a refresh fails terminally.
    pub fn expire(&self) {
        self.clear();
        self.inner.ended_tx.send_if_modified(|ended| {
            let changed = !*ended;
            *ended = true;
            changed
        });
        tracing::warn!("[Session] session expired, store cleared");
    }

    /// Whether the session has ended and not been re-established since.
    pub fn is_ended(&self) -> bool {
        *self.inner.ended_tx.borrow()
    }

    /// Subscribe to the session-ended signal. The receiver yields `true`
    /// once the session expires; a later login resets it to `false`.
    pub fn on_session_ended(&self) -> watch::Receiver<bool> {
        self.inner.ended_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_starts_empty() {
        let store = SessionStore::new();
        assert!(store.token().is_none());
        assert!(store.identity().is_none());
        assert!(!store.is_ended());
    }

    #[test]
    fn test_set_and_clear_token() {
        let store = SessionStore::new();
        store.set_token("tok1");
        assert_eq!(store.token().as_deref(), Some("tok1"));

        store.clear();
        assert!(store.token().is_none());
    }

    #[test]
    fn test_expire_clears_and_signals() {
        let store = SessionStore::new();
        store.set_token("tok1");
        store.set_identity(Identity {
            user_id: 7,
            nickname: "mina".to_string(),
        });

        let rx = store.on_session_ended();
        store.expire();

        assert!(store.token().is_none());
        assert!(store.identity().is_none());
        assert!(*rx.borrow());
        assert!(store.is_ended());
    }

    #[test]
    fn test_login_after_expiry_rearms_signal() {
        let store = SessionStore::new();
        store.set_token("tok1");
        store.expire();
        assert!(store.is_ended());

        store.set_token("tok2");
        assert!(!store.is_ended());
        assert_eq!(store.token().as_deref(), Some("tok2"));
    }

    #[test]
    fn test_clones_share_state() {
        let store = SessionStore::new();
        let other = store.clone();
        store.set_token("tok1");
        assert_eq!(other.token().as_deref(), Some("tok1"));
    }
}
