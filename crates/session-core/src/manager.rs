//! The assembled session kernel.
//!
//! [`SessionManager`] wires the store, identity provider, broadcaster, and
//! refresh scheduler together the way a shell application uses them: restore
//! a persisted session at startup, reconcile remote login/logout events, and
//! keep the token fresh while a session exists. UI fragments hold an
//! `Arc<SessionManager>` and consume the snapshot/subscription surface.

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::broadcast::{BroadcastTransport, Broadcaster, EventKind};
use crate::config::{SessionConfig, TokenPolicy};
use crate::errors::{AuthError, Result};
use crate::guard::AccessGuard;
use crate::provider::{AuthenticationResult, Provider, RedirectCallback};
use crate::refresh::RefreshScheduler;
use crate::state::{AuthState, StatePatch};
use crate::storage::StorageBackend;
use crate::store::{SessionStore, Subscription};

/// How a login request concluded.
#[derive(Debug)]
pub enum LoginOutcome {
    /// The session is established.
    Completed(AuthenticationResult),
    /// The host must navigate to the authorize URL; the flow resumes via
    /// [`SessionManager::complete_redirect_login`] after the callback.
    RedirectRequired(String),
}

/// One browsing context's assembled session kernel.
pub struct SessionManager {
    store: Arc<SessionStore>,
    broadcaster: Arc<Broadcaster>,
    provider: Arc<Provider>,
    guard: AccessGuard,
    policy: TokenPolicy,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

impl SessionManager {
    /// Build and start the kernel: validate configuration, restore any
    /// persisted session, attach cross-context reconciliation, and start
    /// background renewal when a session was restored.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when validation fails (see
    /// [`SessionConfig::resolve`]) or the provider cannot be built.
    pub fn start(
        config: SessionConfig,
        storage: Arc<dyn StorageBackend>,
        transport: Arc<dyn BroadcastTransport>,
    ) -> Result<Arc<Self>> {
        let config = config.resolve()?;

        let store = Arc::new(SessionStore::new(storage));
        let broadcaster = Arc::new(Broadcaster::new(
            transport,
            config.local_origin.clone(),
            config.allowed_origins(),
        ));
        let provider = Arc::new(Provider::from_config(
            &config,
            store.clone(),
            broadcaster.clone(),
        )?);

        let manager = Arc::new(Self {
            guard: AccessGuard::new(store.clone()),
            policy: config.policy.clone(),
            store,
            broadcaster,
            provider,
            scheduler: Mutex::new(None),
        });

        if let Some(snapshot) = manager.store.restore() {
            tracing::info!(
                target: "session_core.manager",
                "Restored persisted session"
            );
            manager.adopt(&snapshot);
        }

        manager.attach_reconcilers();
        Ok(manager)
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.store.get()
    }

    /// Observe every state transition. See [`SessionStore::subscribe`].
    #[must_use]
    pub fn subscribe(
        &self,
        callback: impl Fn(&AuthState) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(callback)
    }

    /// The policy evaluator for the routing layer.
    #[must_use]
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    /// The canonical store, for composition and tests.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The event channel, for fragments that react to lifecycle events
    /// directly.
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// The demo roster, when running in demo mode.
    #[must_use]
    pub fn demo_users(&self) -> Option<&[crate::state::UserProfile]> {
        self.provider.demo_users()
    }

    /// Log in. Demo mode completes after the simulated round trip; OIDC
    /// attempts silent authentication first and hands back the authorize
    /// URL when interaction is required.
    ///
    /// # Errors
    ///
    /// [`AuthError::AlreadyInProgress`] while another attempt is in flight;
    /// adapter errors otherwise.
    pub async fn login(&self) -> Result<LoginOutcome> {
        match self.provider.login().await {
            Ok(result) => {
                self.start_scheduler();
                Ok(LoginOutcome::Completed(result))
            }
            Err(AuthError::InteractionRequired) if !self.provider.is_demo() => {
                Ok(LoginOutcome::RedirectRequired(
                    self.provider.begin_redirect_login()?,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Resume a redirect login from the provider callback.
    ///
    /// # Errors
    ///
    /// See [`Provider::complete_redirect_login`].
    pub async fn complete_redirect_login(
        &self,
        callback: RedirectCallback,
    ) -> Result<AuthenticationResult> {
        let result = self.provider.complete_redirect_login(callback).await?;
        self.start_scheduler();
        Ok(result)
    }

    /// Popup login; the host delivers the popup's callback on `result`.
    ///
    /// # Errors
    ///
    /// See [`Provider::login_popup`].
    pub async fn login_popup(
        &self,
        result: oneshot::Receiver<Result<RedirectCallback>>,
    ) -> Result<AuthenticationResult> {
        let result = self.provider.login_popup(result).await?;
        self.start_scheduler();
        Ok(result)
    }

    /// Log out: cancel background renewal, clear local state, broadcast.
    /// Returns the provider's end-session URL when there is one. A no-op
    /// when already unauthenticated.
    ///
    /// # Errors
    ///
    /// See [`Provider::logout`].
    pub async fn logout(&self) -> Result<Option<String>> {
        self.stop_scheduler();
        self.provider.logout().await
    }

    /// A token guaranteed not to be expired at call time, or `None`.
    pub async fn get_access_token(&self) -> Option<String> {
        self.provider.get_access_token().await
    }

    /// Demo-only: switch roster user.
    ///
    /// # Errors
    ///
    /// See [`Provider::switch_user`].
    pub async fn switch_user(&self, index: usize) -> Result<AuthenticationResult> {
        let result = self.provider.switch_user(index).await?;
        self.start_scheduler();
        Ok(result)
    }

    /// Consume the recorded post-login navigation target.
    #[must_use]
    pub fn take_return_url(&self) -> Option<String> {
        self.store.take_return_url()
    }

    /// Re-derive the local session after a remote context reported a login:
    /// first from shared persisted state, then through the adapter's silent
    /// path. Never trusts the remote payload.
    pub async fn recheck(&self) {
        if self.store.get().is_authenticated {
            return;
        }

        if let Some(snapshot) = self.store.restore() {
            tracing::debug!(
                target: "session_core.manager",
                "Recheck adopted session from shared storage"
            );
            self.adopt(&snapshot);
            return;
        }

        if self.provider.silent_renew().await.is_ok() {
            self.start_scheduler();
        }
    }

    fn adopt(&self, snapshot: &AuthState) {
        self.store.update(StatePatch {
            is_authenticated: Some(true),
            user: Some(snapshot.user.clone()),
            access_token: Some(snapshot.access_token.clone()),
            id_token: Some(snapshot.id_token.clone()),
            is_loading: Some(false),
            error: Some(None),
        });
        self.provider.adopt_restored();
        self.start_scheduler();

        self.broadcaster.publish(
            EventKind::LoginSuccess,
            snapshot
                .user
                .as_ref()
                .and_then(|u| serde_json::to_value(u).ok()),
        );
    }

    fn attach_reconcilers(self: &Arc<Self>) {
        // Remote login while locally unauthenticated: recheck through the
        // local adapter. Our own LOGIN_SUCCESS arrives after the store is
        // already authenticated, so the guard below makes it a no-op.
        let weak = Arc::downgrade(self);
        self.broadcaster.subscribe(EventKind::LoginSuccess, move |_| {
            let Some(manager) = weak.upgrade() else { return };
            if manager.store.get().is_authenticated {
                return;
            }
            tokio::spawn(async move {
                manager.recheck().await;
            });
        });

        // Remote logout while locally authenticated: clear immediately, no
        // network round trip.
        let weak = Arc::downgrade(self);
        self.broadcaster
            .subscribe(EventKind::LogoutSuccess, move |_| {
                let Some(manager) = weak.upgrade() else { return };
                if !manager.store.get().is_authenticated {
                    return;
                }
                tracing::info!(
                    target: "session_core.manager",
                    "Remote logout received; clearing local session"
                );
                manager.stop_scheduler();
                manager.provider.reset_flow();
                manager.store.update(StatePatch::logged_out());
            });
    }

    fn start_scheduler(&self) {
        let mut slot = self
            .scheduler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(RefreshScheduler::start(
                self.provider.clone(),
                self.store.clone(),
                self.broadcaster.clone(),
                self.policy.refresh_interval,
            ));
        }
    }

    fn stop_scheduler(&self) {
        let mut slot = self
            .scheduler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(scheduler) = slot.take() {
            scheduler.stop();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("provider", &self.provider)
            .field("state", &self.store.get())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
