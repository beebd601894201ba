//! OIDC identity provider adapter.
//!
//! Delegates interactive login to an external OpenID Connect service and
//! exchanges its callback for a token set at `{authority}/token`. Tokens are
//! consumed as-is; signature and issuer validation happen at the provider
//! and at resource servers, not in a browsing context.
//!
//! The host owns the actual navigation: this adapter hands out the
//! authorize/end-session URLs and accepts the callback parameters, so the
//! same code serves full-page redirects and popup windows.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::OidcConfig;
use crate::errors::{AuthError, Result};
use crate::state::UserProfile;
use crate::token;

use super::AuthenticationResult;

/// Connection timeout for the token endpoint.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// OAuth error codes meaning "a user-facing login is needed".
const INTERACTION_ERRORS: [&str; 4] = [
    "interaction_required",
    "login_required",
    "consent_required",
    "invalid_grant",
];

/// Callback parameters delivered by the provider after an interactive flow.
#[derive(Debug, Clone)]
pub struct RedirectCallback {
    /// Authorization code to exchange at the token endpoint.
    pub code: String,
    /// Opaque state echoed back by the provider, when one was sent.
    pub state: Option<String>,
}

/// Token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Token endpoint error body.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
}

/// Adapter over an external OIDC identity service.
pub struct OidcAdapter {
    config: OidcConfig,
    http: reqwest::Client,
    refresh_token: Mutex<Option<SecretString>>,
}

impl OidcAdapter {
    pub(crate) fn new(config: OidcConfig, http_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            refresh_token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.authority.trim_end_matches('/'))
    }

    /// The URL the host navigates to (full page or popup) to start an
    /// interactive login.
    pub(crate) fn authorize_url(&self) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoint("authorize"),
            [
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", self.config.scopes.join(" ").as_str()),
            ],
        )
        .map_err(|e| AuthError::Configuration(format!("invalid authority URL: {e}")))?;

        Ok(url.to_string())
    }

    /// The URL the host navigates to for the provider's end-session round
    /// trip. Best effort; local state is already cleared by the time this is
    /// used.
    pub(crate) fn end_session_url(&self) -> String {
        match reqwest::Url::parse_with_params(
            &self.endpoint("logout"),
            [(
                "post_logout_redirect_uri",
                self.config.post_logout_redirect_uri.as_str(),
            )],
        ) {
            Ok(url) => url.to_string(),
            Err(_) => self.endpoint("logout"),
        }
    }

    /// Exchange an authorization code for a token set.
    pub(crate) async fn exchange_code(
        &self,
        callback: &RedirectCallback,
    ) -> Result<AuthenticationResult> {
        tracing::debug!(
            target: "session_core.provider",
            has_state = callback.state.is_some(),
            "Exchanging authorization code"
        );

        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", callback.code.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ])
        .await
    }

    /// Authenticate without interaction, using the stored refresh token.
    pub(crate) async fn silent_login(&self) -> Result<AuthenticationResult> {
        let refresh = self
            .locked_refresh_token()
            .as_ref()
            .map(|t| t.expose_secret().to_string());

        let Some(refresh) = refresh else {
            tracing::debug!(
                target: "session_core.provider",
                "No refresh token; silent authentication needs interaction"
            );
            return Err(AuthError::InteractionRequired);
        };

        let outcome = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
            ])
            .await;

        // A refresh token the provider no longer accepts is dead weight.
        if matches!(outcome, Err(AuthError::InteractionRequired)) {
            self.clear_refresh_token();
        }
        outcome
    }

    pub(crate) fn clear_refresh_token(&self) {
        *self.locked_refresh_token() = None;
    }

    fn locked_refresh_token(&self) -> std::sync::MutexGuard<'_, Option<SecretString>> {
        self.refresh_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<AuthenticationResult> {
        let url = self.endpoint("token");
        let response = self.http.post(&url).form(form).send().await.map_err(|e| {
            tracing::debug!(target: "session_core.provider", error = %e, "Token endpoint unreachable");
            AuthError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| AuthError::Network(format!("invalid token response: {e}")))?;
            return self.accept(body);
        }

        if status.as_u16() == 400 || status.as_u16() == 401 {
            let err: TokenErrorResponse = response.json().await.unwrap_or_default();
            tracing::warn!(
                target: "session_core.provider",
                status = %status,
                error = %err.error,
                "Token request rejected"
            );
            if INTERACTION_ERRORS.contains(&err.error.as_str()) {
                return Err(AuthError::InteractionRequired);
            }
            return Err(AuthError::Network(format!(
                "token request rejected: {status} {}",
                err.error
            )));
        }

        tracing::warn!(
            target: "session_core.provider",
            status = %status,
            "Token endpoint returned an unexpected status"
        );
        Err(AuthError::Network(format!(
            "token endpoint status {status}"
        )))
    }

    fn accept(&self, body: TokenResponse) -> Result<AuthenticationResult> {
        // Identity claims come from the id token; an access-token payload is
        // accepted as a fallback for providers that issue claim-bearing
        // access tokens only.
        let claims = match &body.id_token {
            Some(id_token) => token::decode_payload(id_token)?,
            None => token::decode_payload(&body.access_token)?,
        };

        let user = UserProfile::from_claims(&claims);

        let expires_at = claims.exp.or_else(|| {
            body.expires_in.map(|secs| {
                #[allow(clippy::cast_possible_wrap)]
                let secs = secs as i64;
                chrono::Utc::now().timestamp() + secs
            })
        });

        if let Some(refresh) = body.refresh_token.clone() {
            *self.locked_refresh_token() = Some(SecretString::from(refresh));
        }

        Ok(AuthenticationResult {
            user,
            access_token: body.access_token,
            id_token: body.id_token,
            expires_at,
        })
    }
}

impl std::fmt::Debug for OidcAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcAdapter")
            .field("authority", &self.config.authority)
            .field("client_id", &self.config.client_id)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
