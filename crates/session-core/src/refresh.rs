//! Background silent-renewal scheduler.
//!
//! While a session exists, a recurring task renews the access token ahead of
//! expiry so fragments never hand out a stale credential. When renewal needs
//! user interaction the scheduler only broadcasts `TOKEN_EXPIRED`; deciding
//! whether to send the user to a login page belongs to the guard and the UI,
//! not to a background timer.
//!
//! The task is owned: [`RefreshScheduler::stop`] (or drop) aborts it, and a
//! tick that fires after logout re-checks the session and does nothing.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::broadcast::{Broadcaster, EventKind};
use crate::errors::AuthError;
use crate::provider::Provider;
use crate::store::SessionStore;

/// Handle on the recurring silent-renewal task.
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Spawn the renewal loop. The first tick fires one full interval after
    /// start; login itself already produced a fresh token.
    #[must_use]
    pub fn start(
        provider: Arc<Provider>,
        store: Arc<SessionStore>,
        broadcaster: Arc<Broadcaster>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;

                if !store.get().is_authenticated {
                    tracing::trace!(
                        target: "session_core.refresh",
                        "Tick while unauthenticated; skipping renewal"
                    );
                    continue;
                }

                match provider.silent_renew().await {
                    Ok(_) => {
                        tracing::debug!(
                            target: "session_core.refresh",
                            "Scheduled renewal completed"
                        );
                    }
                    Err(AuthError::InteractionRequired) => {
                        tracing::info!(
                            target: "session_core.refresh",
                            "Scheduled renewal needs interaction; leaving the decision to the UI"
                        );
                        broadcaster.publish(EventKind::TokenExpired, None);
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "session_core.refresh",
                            error = %e,
                            "Scheduled renewal failed; will retry next tick"
                        );
                    }
                }
            }
        });

        Self { handle }
    }

    /// Cancel the renewal loop.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("running", &!self.handle.is_finished())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
