//! Canonical session state and user profile types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::token::Claims;

// =============================================================================
// UserProfile
// =============================================================================

/// Identity attributes of the signed-in user.
///
/// Immutable once constructed; replaced wholesale on re-authentication,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable user identifier (the token `sub`).
    pub id: String,
    /// E-mail address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Granted roles.
    pub roles: Vec<String>,
    /// Granted fine-grained permissions. When the identity provider issues
    /// only roles, this defaults to the role names so both demo and
    /// production sessions evaluate identically in the access guard.
    pub permissions: Vec<String>,
    /// Tenant identifier.
    pub tenant_id: String,
    /// Preferred sign-in name.
    pub preferred_username: String,
}

impl UserProfile {
    /// Build a profile from decoded token claims.
    #[must_use]
    pub fn from_claims(claims: &Claims) -> Self {
        let permissions = if claims.permissions.is_empty() {
            claims.roles.clone()
        } else {
            claims.permissions.clone()
        };

        Self {
            id: claims.sub.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
            roles: claims.roles.clone(),
            permissions,
            tenant_id: claims.tid.clone(),
            preferred_username: if claims.preferred_username.is_empty() {
                claims.email.clone()
            } else {
                claims.preferred_username.clone()
            },
        }
    }

    /// Whether the user holds a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the user holds any of the given roles.
    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }

    /// Whether the user holds a specific permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Whether the user holds any of the given permissions.
    #[must_use]
    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }
}

// =============================================================================
// AuthState
// =============================================================================

/// The single mutable session record.
///
/// Invariant: `is_authenticated` implies `user` and `access_token` are
/// present. The store enforces this on every transition.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthState {
    /// Whether a live session exists.
    pub is_authenticated: bool,
    /// The signed-in user, if any.
    pub user: Option<UserProfile>,
    /// Opaque bearer credential.
    pub access_token: Option<String>,
    /// Token carrying identity claims.
    pub id_token: Option<String>,
    /// True while a state transition is in progress.
    pub is_loading: bool,
    /// Human-readable description of the last failure, if any.
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            access_token: None,
            id_token: None,
            is_loading: false,
            error: None,
        }
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("is_authenticated", &self.is_authenticated)
            .field("user", &self.user.as_ref().map(|u| u.id.as_str()))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("is_loading", &self.is_loading)
            .field("error", &self.error)
            .finish()
    }
}

// =============================================================================
// StatePatch
// =============================================================================

/// A partial update to [`AuthState`], merged shallowly by the store.
///
/// Outer `None` leaves the field untouched; for nullable fields the inner
/// option is the new value (`Some(None)` clears).
#[derive(Debug, Default, Clone)]
pub struct StatePatch {
    /// New authenticated flag, if changing.
    pub is_authenticated: Option<bool>,
    /// New user, if changing.
    pub user: Option<Option<UserProfile>>,
    /// New access token, if changing.
    pub access_token: Option<Option<String>>,
    /// New id token, if changing.
    pub id_token: Option<Option<String>>,
    /// New loading flag, if changing.
    pub is_loading: Option<bool>,
    /// New error, if changing.
    pub error: Option<Option<String>>,
}

impl StatePatch {
    /// A new attempt is starting: loading, and any stale error cleared.
    #[must_use]
    pub fn begin_attempt() -> Self {
        Self {
            is_loading: Some(true),
            error: Some(None),
            ..Self::default()
        }
    }

    /// An attempt failed: error recorded, loading cleared.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_loading: Some(false),
            error: Some(Some(message.into())),
            ..Self::default()
        }
    }

    /// A full authenticated session.
    #[must_use]
    pub fn authenticated(
        user: UserProfile,
        access_token: String,
        id_token: Option<String>,
    ) -> Self {
        Self {
            is_authenticated: Some(true),
            user: Some(Some(user)),
            access_token: Some(Some(access_token)),
            id_token: Some(id_token),
            is_loading: Some(false),
            error: Some(None),
        }
    }

    /// Everything cleared.
    #[must_use]
    pub fn logged_out() -> Self {
        Self {
            is_authenticated: Some(false),
            user: Some(None),
            access_token: Some(None),
            id_token: Some(None),
            is_loading: Some(false),
            error: Some(None),
        }
    }

    /// Replace only the token pair, keeping the session otherwise intact.
    #[must_use]
    pub fn tokens(access_token: String, id_token: Option<String>) -> Self {
        Self {
            access_token: Some(Some(access_token)),
            id_token: Some(id_token),
            ..Self::default()
        }
    }

    /// Merge this patch into `state`.
    pub fn apply(self, state: &mut AuthState) {
        if let Some(v) = self.is_authenticated {
            state.is_authenticated = v;
        }
        if let Some(v) = self.user {
            state.user = v;
        }
        if let Some(v) = self.access_token {
            state.access_token = v;
        }
        if let Some(v) = self.id_token {
            state.id_token = v;
        }
        if let Some(v) = self.is_loading {
            state.is_loading = v;
        }
        if let Some(v) = self.error {
            state.error = v;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
