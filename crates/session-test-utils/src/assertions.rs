//! Assertion helpers for session state.

use session_core::state::AuthState;

/// Chainable assertions over an [`AuthState`] snapshot.
pub trait StateAssertions {
    /// Assert a live session for the given user id.
    fn assert_authenticated_as(&self, user_id: &str) -> &Self;

    /// Assert no session and no leftover credentials.
    fn assert_unauthenticated(&self) -> &Self;

    /// Assert the recorded error mentions `fragment`.
    fn assert_error_contains(&self, fragment: &str) -> &Self;

    /// Assert no transition is in progress.
    fn assert_idle(&self) -> &Self;
}

impl StateAssertions for AuthState {
    #[allow(clippy::expect_used, clippy::panic)]
    fn assert_authenticated_as(&self, user_id: &str) -> &Self {
        assert!(self.is_authenticated, "expected an authenticated session");
        let user = self.user.as_ref().expect("authenticated state must carry a user");
        assert_eq!(user.id, user_id, "unexpected session user");
        assert!(
            self.access_token.is_some(),
            "authenticated state must carry an access token"
        );
        self
    }

    fn assert_unauthenticated(&self) -> &Self {
        assert!(!self.is_authenticated, "expected no session");
        assert!(self.user.is_none(), "unauthenticated state carries a user");
        assert!(
            self.access_token.is_none(),
            "unauthenticated state carries an access token"
        );
        self
    }

    #[allow(clippy::expect_used)]
    fn assert_error_contains(&self, fragment: &str) -> &Self {
        let error = self.error.as_ref().expect("expected an error to be recorded");
        assert!(
            error.contains(fragment),
            "error '{error}' does not mention '{fragment}'"
        );
        self
    }

    fn assert_idle(&self) -> &Self {
        assert!(!self.is_loading, "expected no transition in progress");
        self
    }
}
