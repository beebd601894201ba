//! Kernel configuration.
//!
//! The identity provider variant is chosen here, at construction time, and
//! nowhere else; business logic never sniffs the environment. Validation is
//! fail-fast: a production deployment with a missing or placeholder client
//! id refuses to start, while a development deployment logs a warning and
//! falls back to the demo roster.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::errors::{AuthError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Placeholder client id shipped in sample configuration; never valid.
pub const PLACEHOLDER_CLIENT_ID: &str = "your-client-id-here";

/// Default interval between silent-renewal attempts (30 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Renew when the token expires within this window (5 minutes).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// How long an interactive redirect/popup flow may wait for the provider.
pub const DEFAULT_INTERACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Artificial latency of the demo adapter's login round trip.
pub const DEFAULT_DEMO_LATENCY: Duration = Duration::from_secs(1);

/// HTTP request timeout for token-endpoint round trips.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Scopes requested when none are configured.
const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];

// =============================================================================
// Types
// =============================================================================

/// Deployment class, controlling how configuration errors degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Local/dev: invalid provider configuration falls back to demo mode.
    Development,
    /// Production: invalid provider configuration is a startup failure.
    Production,
}

/// External OpenID Connect identity provider settings.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer base URL; `{authority}/authorize` and `{authority}/token` are
    /// the interactive and token endpoints.
    pub authority: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret; redacted in `Debug` output.
    pub client_secret: SecretString,
    /// Callback URI the provider redirects back to after interactive login.
    pub redirect_uri: String,
    /// Where the provider sends the browser after an end-session round trip.
    pub post_logout_redirect_uri: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// Which identity provider adapter to construct.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// In-memory roster with synthetic tokens.
    Demo,
    /// External OpenID Connect service.
    Oidc(OidcConfig),
}

/// Timing policy for tokens and interactive flows.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Interval between background silent-renewal attempts.
    pub refresh_interval: Duration,
    /// Renew eagerly when expiry is within this window.
    pub refresh_threshold: Duration,
    /// Upper bound on waiting for an interactive flow's result.
    pub interaction_timeout: Duration,
    /// Simulated network latency in demo mode.
    pub demo_latency: Duration,
    /// HTTP request timeout for provider round trips.
    pub http_timeout: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            interaction_timeout: DEFAULT_INTERACTION_TIMEOUT,
            demo_latency: DEFAULT_DEMO_LATENCY,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl TokenPolicy {
    /// Set the silent-renewal interval.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the expiry window that triggers eager renewal.
    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Set the interactive-flow timeout.
    #[must_use]
    pub fn with_interaction_timeout(mut self, timeout: Duration) -> Self {
        self.interaction_timeout = timeout;
        self
    }

    /// Set the demo adapter's artificial latency.
    #[must_use]
    pub fn with_demo_latency(mut self, latency: Duration) -> Self {
        self.demo_latency = latency;
        self
    }
}

/// Full kernel configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deployment class.
    pub deployment: Deployment,
    /// Identity provider selection.
    pub provider: ProviderConfig,
    /// Origin of this browsing context.
    pub local_origin: String,
    /// Peer browsing-context origins trusted for auth event exchange.
    pub peer_origins: Vec<String>,
    /// Timing policy.
    pub policy: TokenPolicy,
}

impl SessionConfig {
    /// Demo-mode configuration for a single origin.
    #[must_use]
    pub fn demo(local_origin: impl Into<String>) -> Self {
        Self {
            deployment: Deployment::Development,
            provider: ProviderConfig::Demo,
            local_origin: local_origin.into(),
            peer_origins: Vec::new(),
            policy: TokenPolicy::default(),
        }
    }

    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] on missing or invalid settings.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map (testable without process env).
    ///
    /// Recognized keys: `SESSION_DEPLOYMENT`, `SESSION_ORIGIN`,
    /// `SESSION_PEER_ORIGINS` (comma-separated), `SESSION_PROVIDER`
    /// (`demo`/`oidc`), `OIDC_AUTHORITY`, `OIDC_CLIENT_ID`,
    /// `OIDC_CLIENT_SECRET`, `OIDC_REDIRECT_URI`,
    /// `OIDC_POST_LOGOUT_REDIRECT_URI`, `OIDC_SCOPES` (space-separated),
    /// `SESSION_REFRESH_INTERVAL_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] on missing or invalid settings.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let deployment = match vars.get("SESSION_DEPLOYMENT").map(String::as_str) {
            Some("production") => Deployment::Production,
            Some("development") | None => Deployment::Development,
            Some(other) => {
                return Err(AuthError::Configuration(format!(
                    "SESSION_DEPLOYMENT must be 'development' or 'production', got '{other}'"
                )))
            }
        };

        let local_origin = vars
            .get("SESSION_ORIGIN")
            .cloned()
            .ok_or_else(|| AuthError::Configuration("missing SESSION_ORIGIN".to_string()))?;

        let peer_origins = vars
            .get("SESSION_PEER_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let provider = match vars.get("SESSION_PROVIDER").map(String::as_str) {
            Some("demo") | None => ProviderConfig::Demo,
            Some("oidc") => {
                let scopes = vars
                    .get("OIDC_SCOPES")
                    .map(|s| s.split_whitespace().map(ToString::to_string).collect())
                    .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(ToString::to_string).collect());

                ProviderConfig::Oidc(OidcConfig {
                    authority: vars.get("OIDC_AUTHORITY").cloned().unwrap_or_default(),
                    client_id: vars.get("OIDC_CLIENT_ID").cloned().unwrap_or_default(),
                    client_secret: SecretString::from(
                        vars.get("OIDC_CLIENT_SECRET").cloned().unwrap_or_default(),
                    ),
                    redirect_uri: vars
                        .get("OIDC_REDIRECT_URI")
                        .cloned()
                        .unwrap_or_else(|| local_origin.clone()),
                    post_logout_redirect_uri: vars
                        .get("OIDC_POST_LOGOUT_REDIRECT_URI")
                        .cloned()
                        .unwrap_or_else(|| local_origin.clone()),
                    scopes,
                })
            }
            Some(other) => {
                return Err(AuthError::Configuration(format!(
                    "SESSION_PROVIDER must be 'demo' or 'oidc', got '{other}'"
                )))
            }
        };

        let mut policy = TokenPolicy::default();
        if let Some(secs) = vars.get("SESSION_REFRESH_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                AuthError::Configuration(
                    "SESSION_REFRESH_INTERVAL_SECS must be an integer".to_string(),
                )
            })?;
            policy.refresh_interval = Duration::from_secs(secs);
        }

        Self {
            deployment,
            provider,
            local_origin,
            peer_origins,
            policy,
        }
        .resolve()
    }

    /// Validate the provider selection against the deployment class.
    ///
    /// Invalid OIDC settings fall back to demo in development and fail hard
    /// in production; the demo roster itself is never allowed in production.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] for the production failure cases.
    pub fn resolve(mut self) -> Result<Self> {
        if matches!(self.provider, ProviderConfig::Demo) {
            if self.deployment == Deployment::Production {
                tracing::error!(
                    target: "session_core.config",
                    "Refusing to start: demo identity provider selected in production"
                );
                return Err(AuthError::Configuration(
                    "demo identity provider is not available in production".to_string(),
                ));
            }
            return Ok(self);
        }

        let invalid = match &self.provider {
            ProviderConfig::Oidc(oidc) => {
                oidc.authority.is_empty()
                    || oidc.client_id.is_empty()
                    || oidc.client_id == PLACEHOLDER_CLIENT_ID
            }
            ProviderConfig::Demo => false,
        };

        if invalid {
            match self.deployment {
                Deployment::Production => {
                    tracing::error!(
                        target: "session_core.config",
                        "Refusing to start: identity provider client id missing or placeholder"
                    );
                    return Err(AuthError::Configuration(
                        "identity provider client id is missing or a placeholder".to_string(),
                    ));
                }
                Deployment::Development => {
                    tracing::warn!(
                        target: "session_core.config",
                        "Identity provider configuration incomplete; falling back to demo mode"
                    );
                    self.provider = ProviderConfig::Demo;
                }
            }
        }
        Ok(self)
    }

    /// Origins trusted for cross-context auth messages: every configured
    /// peer plus the local origin.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = self.peer_origins.clone();
        if !origins.iter().any(|o| o == &self.local_origin) {
            origins.push(self.local_origin.clone());
        }
        origins
    }
}

// =============================================================================
// Tests
// =============================================================================
