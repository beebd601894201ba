//! Pluggable persisted-session storage.
//!
//! The persisted session is shared across all browsing contexts of the same
//! origin; writes are last-write-wins with no cross-context locking. A host
//! supplies whatever backing the platform offers (web storage, a file, a
//! keychain); the in-memory implementation here backs tests and non-browser
//! hosts, and its `Clone` is a shared handle so several contexts can see the
//! same entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{AuthError, Result};

// =============================================================================
// Key namespace
// =============================================================================

/// Serialized [`crate::state::UserProfile`] of the persisted session.
pub const USER_KEY: &str = "auth:user";

/// Access token of the persisted session.
pub const TOKEN_KEY: &str = "auth:token";

/// Pre-login navigation target, cleared once consumed.
pub const RETURN_URL_KEY: &str = "auth:returnUrl";

// =============================================================================
// Backend trait
// =============================================================================

/// A string-keyed store of JSON-serialized values.
pub trait StorageBackend: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;
}

// =============================================================================
// In-memory backend
// =============================================================================

/// In-memory [`StorageBackend`].
///
/// Cloning yields a handle onto the same entries, which is how tests model
/// several browsing contexts sharing one origin's storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AuthError::Storage("storage lock poisoned".to_string()))
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.locked()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.locked()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.locked()?.remove(key);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.locked().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("MemoryStorage").field("entries", &len).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
