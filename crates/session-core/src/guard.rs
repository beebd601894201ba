//! Route access policy evaluation.
//!
//! The guard answers "may this navigation proceed" from the session store
//! alone; it never navigates. Callers get a boolean (or a decision with the
//! implied redirect target) and perform the redirect themselves, which keeps
//! policy testable without a routing layer.

use std::sync::Arc;

use crate::store::SessionStore;

/// Where a denied navigation should send the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    /// No session; interactive login needed.
    Login,
    /// Authenticated but lacking the required role/permission.
    Unauthorized,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Navigation may proceed.
    Allow,
    /// Navigation is denied; the caller decides how to act on the target.
    Deny {
        /// Implied redirect target.
        redirect: RedirectTarget,
    },
}

/// Read-only policy evaluator over the session store.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    store: Arc<SessionStore>,
}

impl AccessGuard {
    /// Create a guard over the store.
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Whether the current user may access a resource guarded by the given
    /// constraints.
    ///
    /// Within each constraint the semantics are OR: holding any one of the
    /// required roles (or permissions) suffices. Supplying both constraints
    /// requires a match in each. No constraints means any authenticated
    /// user passes; an unauthenticated user never passes.
    #[must_use]
    pub fn can_access(
        &self,
        required_roles: Option<&[&str]>,
        required_permissions: Option<&[&str]>,
    ) -> bool {
        let state = self.store.get();

        if !state.is_authenticated {
            return false;
        }
        let Some(user) = &state.user else {
            return false;
        };

        if let Some(roles) = required_roles {
            if !user.has_any_role(roles) {
                return false;
            }
        }
        if let Some(permissions) = required_permissions {
            if !user.has_any_permission(permissions) {
                return false;
            }
        }
        true
    }

    /// Evaluate a navigation to `path`, recording it as the post-login
    /// return target when the denial calls for a login.
    #[must_use]
    pub fn check(
        &self,
        path: &str,
        required_roles: Option<&[&str]>,
        required_permissions: Option<&[&str]>,
    ) -> AccessDecision {
        let state = self.store.get();

        if !state.is_authenticated {
            tracing::warn!(
                target: "session_core.guard",
                path,
                "Access denied: not authenticated"
            );
            if let Err(e) = self.store.save_return_url(path) {
                tracing::warn!(target: "session_core.guard", error = %e, "Failed to record return URL");
            }
            return AccessDecision::Deny {
                redirect: RedirectTarget::Login,
            };
        }

        if !self.can_access(required_roles, required_permissions) {
            tracing::warn!(
                target: "session_core.guard",
                path,
                "Access denied: missing required role or permission"
            );
            return AccessDecision::Deny {
                redirect: RedirectTarget::Unauthorized,
            };
        }

        AccessDecision::Allow
    }
}

// =============================================================================
// Tests
// =============================================================================
