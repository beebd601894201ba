//! Builders for raw three-segment tokens with arbitrary claims.

use session_core::token::{self, Claims};

/// Default test token lifetime (1 hour).
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Builder for test tokens.
///
/// Defaults to a plausible live token for `test-user`; override what the
/// test cares about.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    claims: Claims,
}

impl TokenBuilder {
    /// A live token for `test-user`, expiring in an hour.
    #[must_use]
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            claims: Claims {
                sub: "test-user".to_string(),
                email: "test-user@test.example".to_string(),
                name: "Test User".to_string(),
                preferred_username: "test-user@test.example".to_string(),
                roles: vec!["user".to_string()],
                permissions: Vec::new(),
                tid: "test-tenant".to_string(),
                aud: "test-client".to_string(),
                iss: "https://idp.test.example".to_string(),
                iat: now,
                exp: Some(now + DEFAULT_LIFETIME_SECS),
            },
        }
    }

    /// Set the subject.
    #[must_use]
    pub fn subject(mut self, sub: &str) -> Self {
        self.claims.sub = sub.to_string();
        self
    }

    /// Set the e-mail (and preferred username).
    #[must_use]
    pub fn email(mut self, email: &str) -> Self {
        self.claims.email = email.to_string();
        self.claims.preferred_username = email.to_string();
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.claims.name = name.to_string();
        self
    }

    /// Set the roles claim.
    #[must_use]
    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.claims.roles = roles.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the permissions claim.
    #[must_use]
    pub fn permissions(mut self, permissions: &[&str]) -> Self {
        self.claims.permissions = permissions.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the tenant claim.
    #[must_use]
    pub fn tenant(mut self, tid: &str) -> Self {
        self.claims.tid = tid.to_string();
        self
    }

    /// Set an explicit expiry (seconds since epoch).
    #[must_use]
    pub fn expires_at(mut self, exp: i64) -> Self {
        self.claims.exp = Some(exp);
        self
    }

    /// Expired a minute ago.
    #[must_use]
    pub fn expired(mut self) -> Self {
        self.claims.exp = Some(chrono::Utc::now().timestamp() - 60);
        self
    }

    /// Strip the expiry claim entirely.
    #[must_use]
    pub fn no_expiry(mut self) -> Self {
        self.claims.exp = None;
        self
    }

    /// The claims as built.
    #[must_use]
    pub fn claims(&self) -> Claims {
        self.claims.clone()
    }

    /// Encode into the three-segment wire format.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails, which only happens on unserializable
    /// claims; fine for a test fixture.
    #[must_use]
    pub fn build(&self) -> String {
        #[allow(clippy::expect_used)]
        token::encode(&self.claims).expect("test token should encode")
    }
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_token_is_live() {
        let token = TokenBuilder::new().build();
        assert!(!token::is_expired(&token, chrono::Utc::now().timestamp()));
    }

    #[test]
    fn test_expired_token_is_expired() {
        let token = TokenBuilder::new().expired().build();
        assert!(token::is_expired(&token, chrono::Utc::now().timestamp()));
    }

    #[test]
    fn test_overrides_land_in_claims() {
        let claims = TokenBuilder::new()
            .subject("alice")
            .roles(&["admin"])
            .permissions(&["write"])
            .claims();

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.roles, vec!["admin"]);
        assert_eq!(claims.permissions, vec!["write"]);
    }
}
