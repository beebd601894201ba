//! Multi-context test harness.
//!
//! A [`TestRealm`] is one "origin group": a shared storage backend and a
//! shared broadcast transport. Spawning several kernels on the same realm
//! models the shell plus its composed fragments, each in its own browsing
//! context, seeing one persisted session and one message channel.

use std::sync::Arc;
use std::time::Duration;

use session_core::broadcast::InProcessTransport;
use session_core::config::{SessionConfig, TokenPolicy};
use session_core::manager::SessionManager;
use session_core::storage::MemoryStorage;

/// Demo latency used by harness-spawned kernels; long enough to observe
/// loading states, short enough for tests.
pub const TEST_DEMO_LATENCY: Duration = Duration::from_millis(10);

/// A shared storage + transport pair, plus the kernels attached to it.
pub struct TestRealm {
    storage: MemoryStorage,
    transport: InProcessTransport,
}

impl TestRealm {
    /// An empty realm.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: MemoryStorage::new(),
            transport: InProcessTransport::new(),
        }
    }

    /// Handle onto the realm's shared storage.
    #[must_use]
    pub fn storage(&self) -> MemoryStorage {
        self.storage.clone()
    }

    /// A demo-mode configuration for a context in this realm.
    #[must_use]
    pub fn demo_config(&self, origin: &str, peers: &[&str]) -> SessionConfig {
        let mut config = SessionConfig::demo(origin);
        config.peer_origins = peers.iter().map(ToString::to_string).collect();
        config.policy = TokenPolicy::default().with_demo_latency(TEST_DEMO_LATENCY);
        config
    }

    /// Spawn a demo-mode kernel for one browsing context.
    ///
    /// # Panics
    ///
    /// Panics when the kernel fails to start; test configuration is static.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn spawn_context(&self, origin: &str, peers: &[&str]) -> Arc<SessionManager> {
        self.spawn_context_with(self.demo_config(origin, peers))
    }

    /// Spawn a kernel with an explicit configuration, attached to this
    /// realm's storage and transport.
    ///
    /// # Panics
    ///
    /// Panics when the kernel fails to start.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn spawn_context_with(&self, config: SessionConfig) -> Arc<SessionManager> {
        SessionManager::start(
            config,
            Arc::new(self.storage.clone()),
            Arc::new(self.transport.clone()),
        )
        .expect("test kernel should start")
    }
}

impl Default for TestRealm {
    fn default() -> Self {
        Self::new()
    }
}

/// Let spawned dispatch tasks (broadcast delivery, reconciliation) run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
