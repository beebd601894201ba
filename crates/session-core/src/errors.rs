//! Error taxonomy for the session kernel.
//!
//! Recoverable failures (an expired token, a renewal that needs user
//! interaction) are reflected into `AuthState { error, is_loading }` for the
//! UI to render; they are not thrown at callers. The variants here exist so
//! the adapter, scheduler, and guard can tell those cases apart.

use thiserror::Error;

/// Errors that can occur across the session kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token cannot be parsed; treated the same as expired or absent.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Silent renewal was insufficient; a user-facing login is required.
    #[error("Interaction required: silent authentication could not complete")]
    InteractionRequired,

    /// An interactive flow exceeded its time budget.
    #[error("Interactive login timed out")]
    InteractionTimeout,

    /// The user dismissed a popup or otherwise abandoned an interactive flow.
    #[error("Interactive login was cancelled")]
    UserCancelled,

    /// A login attempt was issued while another is already in flight.
    #[error("A login attempt is already in progress")]
    AlreadyInProgress,

    /// Demo user switch outside the roster bounds.
    #[error("Invalid demo user index {index} (roster has {roster_len} users)")]
    InvalidIndex {
        /// The rejected index.
        index: usize,
        /// Number of users in the roster.
        roster_len: usize,
    },

    /// Identity provider unreachable or returned a transport-level failure.
    /// Distinct from an authentication rejection; retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid or incomplete kernel configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisted-session backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias using [`AuthError`].
pub type Result<T> = std::result::Result<T, AuthError>;
