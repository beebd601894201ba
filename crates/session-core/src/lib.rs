//! Session kernel shared across independently deployed UI fragments.
//!
//! One browsing context logs in; every composed fragment (iframe, sibling
//! window, or the shell itself) observes the same session: a single
//! [`store::SessionStore`] owns the canonical [`state::AuthState`], a
//! [`broadcast::Broadcaster`] reconciles lifecycle events across contexts
//! over an origin-checked channel, and a [`refresh::RefreshScheduler`]
//! silently renews the access token before it expires.
//!
//! The identity provider is pluggable: a demo roster with synthetic tokens
//! for development, or an external OpenID Connect service reached through
//! redirect/popup interactive flows. See [`manager::SessionManager`] for the
//! assembled kernel.

#![warn(clippy::pedantic)]

// Re-exported so hosts can build an `OidcConfig` without pinning their own
// copy of the crate.
pub use secrecy;

/// Error taxonomy shared across the kernel
pub mod errors;

/// Compact three-segment signed-claims token codec
pub mod token;

/// Canonical session state and user profile types
pub mod state;

/// Pluggable persisted-session storage backends
pub mod storage;

/// The canonical session store (single source of truth)
pub mod store;

/// Kernel configuration and validation
pub mod config;

/// Cross-context authentication event channel
pub mod broadcast;

/// Identity provider adapters (demo roster and OIDC)
pub mod provider;

/// Background silent-renewal scheduler
pub mod refresh;

/// Route access policy evaluation
pub mod guard;

/// Assembled kernel facade
pub mod manager;
