//! Demo identity provider: a fixed in-memory roster with synthetic tokens.
//!
//! Development and demo deployments run against this adapter so the kernel
//! behaves identically with and without a real identity service: the same
//! state transitions, the same broadcasts, the same token format. Latency
//! is simulated so loading states are actually visible.

use std::time::Duration;

use crate::errors::{AuthError, Result};
use crate::state::UserProfile;
use crate::token::{self, Claims};

use super::AuthenticationResult;

/// Synthetic token lifetime (1 hour).
const DEMO_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Issuer claim stamped into synthetic tokens.
const DEMO_ISSUER: &str = "https://demo.idp.example";

/// Audience claim stamped into synthetic tokens.
const DEMO_AUDIENCE: &str = "demo-client-id";

/// The fixed demo roster and token mint.
pub struct DemoAdapter {
    roster: Vec<UserProfile>,
}

impl DemoAdapter {
    pub(crate) fn new() -> Self {
        Self {
            roster: default_roster(),
        }
    }

    pub(crate) fn roster(&self) -> &[UserProfile] {
        &self.roster
    }

    /// Log in as the roster user at `index` (default: first) after the
    /// configured artificial latency.
    pub(crate) async fn login(
        &self,
        latency: Duration,
        index: Option<usize>,
    ) -> Result<AuthenticationResult> {
        tokio::time::sleep(latency).await;

        let index = index.unwrap_or(0);
        let user = self
            .roster
            .get(index)
            .cloned()
            .ok_or(AuthError::InvalidIndex {
                index,
                roster_len: self.roster.len(),
            })?;

        self.issue(user)
    }

    /// Re-mint a token for the current user. Renewal without a session needs
    /// a login, same as the real provider.
    pub(crate) fn renew(&self, user: Option<UserProfile>) -> Result<AuthenticationResult> {
        let user = user.ok_or(AuthError::InteractionRequired)?;
        self.issue(user)
    }

    fn issue(&self, user: UserProfile) -> Result<AuthenticationResult> {
        let now = chrono::Utc::now().timestamp();
        let expires_at = now + DEMO_TOKEN_LIFETIME_SECS;

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            preferred_username: user.preferred_username.clone(),
            roles: user.roles.clone(),
            permissions: user.permissions.clone(),
            tid: user.tenant_id.clone(),
            aud: DEMO_AUDIENCE.to_string(),
            iss: DEMO_ISSUER.to_string(),
            iat: now,
            exp: Some(expires_at),
        };

        let token = token::encode(&claims)?;
        Ok(AuthenticationResult {
            user,
            access_token: token.clone(),
            id_token: Some(token),
            expires_at: Some(expires_at),
        })
    }
}

fn default_roster() -> Vec<UserProfile> {
    vec![
        UserProfile {
            id: "demo-user-1".to_string(),
            email: "admin@demo.com".to_string(),
            name: "Demo Administrator".to_string(),
            roles: vec!["admin".to_string(), "user".to_string()],
            permissions: vec![
                "read".to_string(),
                "write".to_string(),
                "delete".to_string(),
                "manage".to_string(),
            ],
            tenant_id: "demo-tenant".to_string(),
            preferred_username: "admin@demo.com".to_string(),
        },
        UserProfile {
            id: "demo-user-2".to_string(),
            email: "user@demo.com".to_string(),
            name: "Demo User".to_string(),
            roles: vec!["user".to_string()],
            permissions: vec!["read".to_string()],
            tenant_id: "demo-tenant".to_string(),
            preferred_username: "user@demo.com".to_string(),
        },
        UserProfile {
            id: "demo-user-3".to_string(),
            email: "manager@demo.com".to_string(),
            name: "Demo Manager".to_string(),
            roles: vec!["manager".to_string(), "user".to_string()],
            permissions: vec!["read".to_string(), "write".to_string()],
            tenant_id: "demo-tenant".to_string(),
            preferred_username: "manager@demo.com".to_string(),
        },
    ]
}

// =============================================================================
// Tests
// =============================================================================
