//! Identity provider adapters.
//!
//! Two variants behind one surface, selected at construction time from
//! configuration: a demo roster with synthetic tokens, and an external
//! OpenID Connect service reached through redirect/popup interactive flows.
//!
//! Both variants drive the same state machine:
//!
//! ```text
//! Unauthenticated -> Authenticating -> {Authenticated, Failed}
//! Authenticated   -> Authenticating    (refresh / re-login)
//! Authenticated   -> Unauthenticated   (logout)
//! Failed          -> Authenticating    (retry)
//! ```
//!
//! A second `login` while one is in flight is rejected with
//! [`AuthError::AlreadyInProgress`]; silent renewals bypass the gate and
//! race last-write-wins, since every fresh token is equally valid.

mod demo;
mod oidc;

pub use demo::DemoAdapter;
pub use oidc::{OidcAdapter, RedirectCallback};

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::broadcast::{Broadcaster, EventKind};
use crate::config::{ProviderConfig, SessionConfig, TokenPolicy};
use crate::errors::{AuthError, Result};
use crate::state::{StatePatch, UserProfile};
use crate::store::SessionStore;
use crate::token;

// =============================================================================
// State machine
// =============================================================================

/// Adapter state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    /// No session.
    Unauthenticated,
    /// A login attempt is in flight.
    Authenticating,
    /// A live session exists.
    Authenticated,
    /// The last attempt failed; retry re-enters `Authenticating`.
    Failed,
}

struct FlowGate(Mutex<AuthFlow>);

impl FlowGate {
    fn new() -> Self {
        Self(Mutex::new(AuthFlow::Unauthenticated))
    }

    fn current(&self) -> AuthFlow {
        *self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set(&self, flow: AuthFlow) {
        *self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = flow;
    }

    /// Enter `Authenticating`, rejecting overlap with an in-flight attempt.
    fn begin(&self) -> Result<FlowAttempt<'_>> {
        let mut flow = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *flow == AuthFlow::Authenticating {
            return Err(AuthError::AlreadyInProgress);
        }
        *flow = AuthFlow::Authenticating;
        drop(flow);
        Ok(FlowAttempt {
            gate: self,
            settled: false,
        })
    }
}

/// In-flight attempt token; settles the gate exactly once. An attempt
/// dropped without settling (a cancelled future) lands in `Failed` so the
/// gate never wedges in `Authenticating`.
struct FlowAttempt<'a> {
    gate: &'a FlowGate,
    settled: bool,
}

impl FlowAttempt<'_> {
    fn succeed(mut self) {
        self.gate.set(AuthFlow::Authenticated);
        self.settled = true;
    }

    fn fail(mut self) {
        self.gate.set(AuthFlow::Failed);
        self.settled = true;
    }
}

impl Drop for FlowAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.set(AuthFlow::Failed);
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of a completed authentication flow.
#[derive(Clone)]
pub struct AuthenticationResult {
    /// The authenticated user.
    pub user: UserProfile,
    /// Fresh access token.
    pub access_token: String,
    /// Identity token, when the provider issued one.
    pub id_token: Option<String>,
    /// Expiry of the access token, seconds since epoch.
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("user", &self.user.id)
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// Provider
// =============================================================================

enum AdapterKind {
    Demo(DemoAdapter),
    Oidc(OidcAdapter),
}

/// The identity provider adapter for one browsing context.
pub struct Provider {
    store: Arc<SessionStore>,
    broadcaster: Arc<Broadcaster>,
    policy: TokenPolicy,
    flow: FlowGate,
    kind: AdapterKind,
}

impl Provider {
    /// Demo-roster provider.
    #[must_use]
    pub fn demo(
        store: Arc<SessionStore>,
        broadcaster: Arc<Broadcaster>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            store,
            broadcaster,
            policy,
            flow: FlowGate::new(),
            kind: AdapterKind::Demo(DemoAdapter::new()),
        }
    }

    /// OIDC provider against an external identity service.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn oidc(
        store: Arc<SessionStore>,
        broadcaster: Arc<Broadcaster>,
        policy: TokenPolicy,
        config: crate::config::OidcConfig,
    ) -> Result<Self> {
        let adapter = OidcAdapter::new(config, policy.http_timeout)?;
        Ok(Self {
            store,
            broadcaster,
            policy,
            flow: FlowGate::new(),
            kind: AdapterKind::Oidc(adapter),
        })
    }

    /// Construct the variant selected by a resolved [`SessionConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the OIDC HTTP client cannot
    /// be built.
    pub fn from_config(
        config: &SessionConfig,
        store: Arc<SessionStore>,
        broadcaster: Arc<Broadcaster>,
    ) -> Result<Self> {
        match &config.provider {
            ProviderConfig::Demo => Ok(Self::demo(store, broadcaster, config.policy.clone())),
            ProviderConfig::Oidc(oidc) => {
                Self::oidc(store, broadcaster, config.policy.clone(), oidc.clone())
            }
        }
    }

    /// Current state machine position.
    #[must_use]
    pub fn flow(&self) -> AuthFlow {
        self.flow.current()
    }

    /// Whether this provider is the demo variant.
    #[must_use]
    pub fn is_demo(&self) -> bool {
        matches!(self.kind, AdapterKind::Demo(_))
    }

    /// Non-interactive login.
    ///
    /// Demo: selects the first roster user after the configured artificial
    /// latency. OIDC: attempts silent authentication and fails with
    /// [`AuthError::InteractionRequired`] when a user-facing flow is needed.
    ///
    /// # Errors
    ///
    /// [`AuthError::AlreadyInProgress`] when a login is already in flight;
    /// adapter-specific errors otherwise.
    pub async fn login(&self) -> Result<AuthenticationResult> {
        let attempt = self.flow.begin()?;
        self.store.update(StatePatch::begin_attempt());

        let outcome = match &self.kind {
            AdapterKind::Demo(demo) => demo.login(self.policy.demo_latency, None).await,
            AdapterKind::Oidc(oidc) => oidc.silent_login().await,
        };

        self.settle_login(attempt, outcome)
    }

    /// Begin a redirect login: records the in-progress state and returns the
    /// authorize URL for the host to navigate to. The flow resumes in a
    /// fresh browsing context via [`Provider::complete_redirect_login`].
    ///
    /// # Errors
    ///
    /// [`AuthError::Configuration`] on the demo variant or a malformed
    /// authority URL.
    pub fn begin_redirect_login(&self) -> Result<String> {
        let AdapterKind::Oidc(oidc) = &self.kind else {
            return Err(AuthError::Configuration(
                "redirect login requires the OIDC provider".to_string(),
            ));
        };

        self.store.update(StatePatch::begin_attempt());
        oidc.authorize_url()
    }

    /// Complete a redirect login from the provider's callback parameters.
    ///
    /// # Errors
    ///
    /// [`AuthError::AlreadyInProgress`] when another attempt is in flight;
    /// [`AuthError::Network`] / [`AuthError::InteractionRequired`] from the
    /// code exchange.
    pub async fn complete_redirect_login(
        &self,
        callback: RedirectCallback,
    ) -> Result<AuthenticationResult> {
        let AdapterKind::Oidc(oidc) = &self.kind else {
            return Err(AuthError::Configuration(
                "redirect login requires the OIDC provider".to_string(),
            ));
        };

        let attempt = self.flow.begin()?;
        self.store.update(StatePatch::begin_attempt());

        let outcome = oidc.exchange_code(&callback).await;
        self.settle_login(attempt, outcome)
    }

    /// Popup login: waits for the host to deliver the popup's callback
    /// parameters on `result`, bounded by the configured interaction
    /// timeout.
    ///
    /// A dropped sender (popup closed) yields [`AuthError::UserCancelled`];
    /// exceeding the budget yields [`AuthError::InteractionTimeout`].
    ///
    /// # Errors
    ///
    /// See above, plus [`AuthError::AlreadyInProgress`] and the code
    /// exchange errors.
    pub async fn login_popup(
        &self,
        result: oneshot::Receiver<Result<RedirectCallback>>,
    ) -> Result<AuthenticationResult> {
        let AdapterKind::Oidc(oidc) = &self.kind else {
            return Err(AuthError::Configuration(
                "popup login requires the OIDC provider".to_string(),
            ));
        };

        let attempt = self.flow.begin()?;
        self.store.update(StatePatch::begin_attempt());

        let callback = match tokio::time::timeout(self.policy.interaction_timeout, result).await {
            Ok(Ok(Ok(callback))) => callback,
            Ok(Ok(Err(e))) => return self.settle_login(attempt, Err(e)),
            Ok(Err(_closed)) => return self.settle_login(attempt, Err(AuthError::UserCancelled)),
            Err(_elapsed) => {
                return self.settle_login(attempt, Err(AuthError::InteractionTimeout))
            }
        };

        let outcome = oidc.exchange_code(&callback).await;
        self.settle_login(attempt, outcome)
    }

    fn settle_login(
        &self,
        attempt: FlowAttempt<'_>,
        outcome: Result<AuthenticationResult>,
    ) -> Result<AuthenticationResult> {
        match outcome {
            Ok(result) => {
                self.store.update(StatePatch::authenticated(
                    result.user.clone(),
                    result.access_token.clone(),
                    result.id_token.clone(),
                ));
                attempt.succeed();

                tracing::info!(
                    target: "session_core.provider",
                    user = %result.user.id,
                    "Login completed"
                );
                self.broadcaster.publish(
                    EventKind::LoginSuccess,
                    serde_json::to_value(&result.user).ok(),
                );
                Ok(result)
            }
            Err(e) => {
                self.store.update(StatePatch::failed(e.to_string()));
                attempt.fail();

                tracing::warn!(target: "session_core.provider", error = %e, "Login failed");
                // Needing interaction is the normal next step of a silent
                // attempt, not a failure other contexts should alert on.
                if e != AuthError::InteractionRequired {
                    self.broadcaster.publish(
                        EventKind::AuthError,
                        Some(serde_json::json!({ "message": e.to_string() })),
                    );
                }
                Err(e)
            }
        }
    }

    /// Clear the session. Local state goes first, unconditionally; a failed
    /// remote end-session round trip never leaves the UI authenticated.
    /// Calling this while already unauthenticated changes nothing and
    /// broadcasts nothing.
    ///
    /// Returns the end-session URL the host should navigate to, when the
    /// provider has one.
    ///
    /// # Errors
    ///
    /// None currently; the signature leaves room for hosts that must
    /// propagate storage failures.
    pub async fn logout(&self) -> Result<Option<String>> {
        if !self.store.get().is_authenticated {
            tracing::debug!(
                target: "session_core.provider",
                "Logout requested while unauthenticated; nothing to do"
            );
            return Ok(None);
        }

        self.store.update(StatePatch::logged_out());
        self.flow.set(AuthFlow::Unauthenticated);

        let end_session = match &self.kind {
            AdapterKind::Demo(_) => None,
            AdapterKind::Oidc(oidc) => {
                oidc.clear_refresh_token();
                Some(oidc.end_session_url())
            }
        };

        tracing::info!(target: "session_core.provider", "Logged out");
        self.broadcaster.publish(EventKind::LogoutSuccess, None);
        Ok(end_session)
    }

    /// A token guaranteed not to be expired at call time, renewing silently
    /// when the current one is missing or inside the refresh threshold.
    /// Returns `None` (never an error) when no session exists or renewal
    /// needs interaction.
    pub async fn get_access_token(&self) -> Option<String> {
        let state = self.store.get();
        let now = chrono::Utc::now().timestamp();

        if state.is_authenticated {
            if let Some(current) = &state.access_token {
                match token::decode_payload(current) {
                    Ok(claims) if !claims.expiring_within(self.policy.refresh_threshold, now) => {
                        return Some(current.clone());
                    }
                    _ => {}
                }
            }
        }

        match self.silent_renew().await {
            Ok(result) => Some(result.access_token),
            Err(e) => {
                tracing::debug!(
                    target: "session_core.provider",
                    error = %e,
                    "No usable access token"
                );
                None
            }
        }
    }

    /// Renew the access token without user interaction and record it in the
    /// store. Concurrent renewals are allowed; the store keeps the last
    /// write.
    ///
    /// # Errors
    ///
    /// [`AuthError::InteractionRequired`] when renewal needs a user-facing
    /// login; [`AuthError::Network`] on transport failures.
    pub async fn silent_renew(&self) -> Result<AuthenticationResult> {
        let outcome = match &self.kind {
            AdapterKind::Demo(demo) => demo.renew(self.store.get().user),
            AdapterKind::Oidc(oidc) => oidc.silent_login().await,
        };

        match outcome {
            Ok(result) => {
                self.store.update(StatePatch {
                    is_authenticated: Some(true),
                    user: Some(Some(result.user.clone())),
                    ..StatePatch::tokens(result.access_token.clone(), result.id_token.clone())
                });
                self.flow.set(AuthFlow::Authenticated);

                tracing::debug!(target: "session_core.provider", "Silent renewal succeeded");
                self.broadcaster.publish(
                    EventKind::TokenAcquired,
                    Some(serde_json::json!({ "expires_at": result.expires_at })),
                );
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    /// Demo-only: switch to a different roster user to exercise another
    /// role set.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidIndex`] outside the roster bounds;
    /// [`AuthError::Configuration`] on the OIDC variant.
    pub async fn switch_user(&self, index: usize) -> Result<AuthenticationResult> {
        let AdapterKind::Demo(demo) = &self.kind else {
            return Err(AuthError::Configuration(
                "switch_user is a demo-mode operation".to_string(),
            ));
        };

        let attempt = self.flow.begin()?;
        self.store.update(StatePatch::begin_attempt());

        match demo.login(self.policy.demo_latency, Some(index)).await {
            Ok(result) => {
                self.store.update(StatePatch::authenticated(
                    result.user.clone(),
                    result.access_token.clone(),
                    result.id_token.clone(),
                ));
                attempt.succeed();

                tracing::info!(
                    target: "session_core.provider",
                    user = %result.user.id,
                    "Switched demo user"
                );
                self.broadcaster.publish(
                    EventKind::UserProfileUpdated,
                    serde_json::to_value(&result.user).ok(),
                );
                Ok(result)
            }
            Err(e) => {
                self.store.update(StatePatch::failed(e.to_string()));
                attempt.fail();
                Err(e)
            }
        }
    }

    /// A session restored from persistence was adopted without a login
    /// round trip.
    pub(crate) fn adopt_restored(&self) {
        self.flow.set(AuthFlow::Authenticated);
    }

    /// A remote context logged the session out; align the state machine.
    pub(crate) fn reset_flow(&self) {
        self.flow.set(AuthFlow::Unauthenticated);
    }

    /// The demo roster, when this is the demo variant.
    #[must_use]
    pub fn demo_users(&self) -> Option<&[UserProfile]> {
        match &self.kind {
            AdapterKind::Demo(demo) => Some(demo.roster()),
            AdapterKind::Oidc(_) => None,
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            AdapterKind::Demo(_) => "demo",
            AdapterKind::Oidc(_) => "oidc",
        };
        f.debug_struct("Provider")
            .field("kind", &kind)
            .field("flow", &self.flow.current())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::broadcast::InProcessTransport;
    use crate::storage::MemoryStorage;
    use std::time::Duration;

    const ORIGIN: &str = "https://shell.example";

    fn fast_policy() -> TokenPolicy {
        TokenPolicy::default().with_demo_latency(Duration::from_millis(5))
    }

    fn demo_provider() -> Arc<Provider> {
        let store = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::new(InProcessTransport::new()),
            ORIGIN,
            vec![ORIGIN.to_string()],
        ));
        Arc::new(Provider::demo(store, broadcaster, fast_policy()))
    }

    #[tokio::test]
    async fn test_flow_gate_rejects_overlapping_attempts() {
        let gate = FlowGate::new();
        let attempt = gate.begin().unwrap();
        assert_eq!(gate.current(), AuthFlow::Authenticating);

        assert!(matches!(gate.begin(), Err(AuthError::AlreadyInProgress)));

        attempt.succeed();
        assert_eq!(gate.current(), AuthFlow::Authenticated);

        // Re-login from Authenticated is allowed.
        gate.begin().unwrap().fail();
        assert_eq!(gate.current(), AuthFlow::Failed);

        // Failed is not terminal.
        assert!(gate.begin().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_attempt_lands_in_failed() {
        let gate = FlowGate::new();
        drop(gate.begin().unwrap());
        assert_eq!(gate.current(), AuthFlow::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_logins_start_one_flow() {
        let provider = demo_provider();

        let (first, second) = tokio::join!(provider.login(), provider.login());

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::AlreadyInProgress))));
        assert_eq!(provider.flow(), AuthFlow::Authenticated);
    }

    #[tokio::test]
    async fn test_interactive_ops_rejected_on_demo_variant() {
        let provider = demo_provider();

        assert!(matches!(
            provider.begin_redirect_login(),
            Err(AuthError::Configuration(_))
        ));

        let (_tx, rx) = oneshot::channel();
        assert!(matches!(
            provider.login_popup(rx).await,
            Err(AuthError::Configuration(_))
        ));
    }
}
