//! The canonical session store.
//!
//! Exactly one [`SessionStore`] owns the live [`AuthState`]; every other
//! component reads snapshots or requests a mutation through [`SessionStore::update`].
//! Subscribers are notified synchronously, in registration order, on every
//! transition, and the merge/persist/notify sequence happens under one lock
//! so no partial state is ever observable.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::errors::Result;
use crate::state::{AuthState, StatePatch, UserProfile};
use crate::storage::{self, StorageBackend};
use crate::token;

type Subscriber = Box<dyn Fn(&AuthState) + Send + Sync>;

struct Inner {
    state: AuthState,
    subscribers: Vec<(u64, Subscriber)>,
    next_subscriber_id: u64,
}

/// Single source of truth for "is the user logged in".
pub struct SessionStore {
    storage: Arc<dyn StorageBackend>,
    inner: Arc<Mutex<Inner>>,
}

impl SessionStore {
    /// Create a store over the given persistence backend, starting from the
    /// default (unauthenticated) state.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            inner: Arc::new(Mutex::new(Inner {
                state: AuthState::default(),
                subscribers: Vec::new(),
                next_subscriber_id: 0,
            })),
        }
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        // Poison recovery: a panicking subscriber must not wedge the session.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current state snapshot.
    #[must_use]
    pub fn get(&self) -> AuthState {
        self.locked().state.clone()
    }

    /// Register an observer, invoked synchronously on every transition in
    /// registration order. Dropping the returned [`Subscription`]
    /// unregisters it.
    ///
    /// Callbacks run under the store lock and must not call back into the
    /// store.
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&AuthState) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.locked();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push((id, Box::new(callback)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Merge a partial update into the current state, persist the session
    /// subset, and notify all subscribers. Atomic with respect to other
    /// updates: no interleaved partial state is observable.
    pub fn update(&self, patch: StatePatch) {
        let mut inner = self.locked();

        let persist_user = patch.user.clone();
        let persist_token = patch.access_token.clone();

        patch.apply(&mut inner.state);

        // isAuthenticated implies user + access token; downgrade rather than
        // expose a half-open session.
        if inner.state.is_authenticated
            && (inner.state.user.is_none() || inner.state.access_token.is_none())
        {
            tracing::warn!(
                target: "session_core.store",
                "Rejecting authenticated state without user/token; treating as unauthenticated"
            );
            inner.state.is_authenticated = false;
        }

        if let Some(user) = persist_user {
            self.persist_user(user.as_ref());
        }
        if let Some(token) = persist_token {
            self.persist_token(token.as_deref());
        }

        tracing::debug!(
            target: "session_core.store",
            is_authenticated = inner.state.is_authenticated,
            is_loading = inner.state.is_loading,
            "Session state transition"
        );

        let snapshot = inner.state.clone();
        for (_, callback) in &inner.subscribers {
            callback(&snapshot);
        }
    }

    fn persist_user(&self, user: Option<&UserProfile>) {
        let outcome = match user {
            Some(user) => serde_json::to_string(user)
                .map_err(|e| crate::errors::AuthError::Storage(e.to_string()))
                .and_then(|json| self.storage.set(storage::USER_KEY, &json)),
            None => self.storage.remove(storage::USER_KEY),
        };
        if let Err(e) = outcome {
            tracing::warn!(target: "session_core.store", error = %e, "Failed to persist user");
        }
    }

    fn persist_token(&self, token: Option<&str>) {
        let outcome = match token {
            Some(token) => self.storage.set(storage::TOKEN_KEY, token),
            None => self.storage.remove(storage::TOKEN_KEY),
        };
        if let Err(e) = outcome {
            tracing::warn!(target: "session_core.store", error = %e, "Failed to persist token");
        }
    }

    /// Read the persisted session, if one exists and its token is still
    /// alive. An expired, malformed, or partial persisted session is cleared
    /// and `None` is returned: dead sessions are never resurrected.
    #[must_use]
    pub fn restore(&self) -> Option<AuthState> {
        self.restore_at(chrono::Utc::now().timestamp())
    }

    /// Deterministic [`SessionStore::restore`] against an explicit `now`.
    pub(crate) fn restore_at(&self, now: i64) -> Option<AuthState> {
        let token = self.storage.get(storage::TOKEN_KEY).ok().flatten()?;
        let user_json = self.storage.get(storage::USER_KEY).ok().flatten()?;

        if token::is_expired(&token, now) {
            tracing::info!(
                target: "session_core.store",
                "Persisted session token expired; clearing instead of restoring"
            );
            self.clear_persisted();
            return None;
        }

        let user: UserProfile = match serde_json::from_str(&user_json) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(
                    target: "session_core.store",
                    error = %e,
                    "Persisted user profile unreadable; clearing session"
                );
                self.clear_persisted();
                return None;
            }
        };

        Some(AuthState {
            is_authenticated: true,
            user: Some(user),
            access_token: Some(token),
            id_token: None,
            is_loading: false,
            error: None,
        })
    }

    fn clear_persisted(&self) {
        for key in [storage::USER_KEY, storage::TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(target: "session_core.store", error = %e, key, "Failed to clear persisted session");
            }
        }
    }

    /// Record the navigation target to return to after login.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::AuthError::Storage`] if the backend cannot
    /// be written.
    pub fn save_return_url(&self, url: &str) -> Result<()> {
        self.storage.set(storage::RETURN_URL_KEY, url)
    }

    /// Consume the recorded return URL, clearing it.
    #[must_use]
    pub fn take_return_url(&self) -> Option<String> {
        let url = self.storage.get(storage::RETURN_URL_KEY).ok().flatten()?;
        if let Err(e) = self.storage.remove(storage::RETURN_URL_KEY) {
            tracing::warn!(target: "session_core.store", error = %e, "Failed to clear return URL");
        }
        Some(url)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.locked().state)
            .finish()
    }
}

/// Observer registration handle; dropping it unsubscribes.
pub struct Subscription {
    inner: Weak<Mutex<Inner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
