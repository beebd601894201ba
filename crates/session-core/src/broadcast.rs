//! Cross-context authentication event channel.
//!
//! Authentication lifecycle events are published to every trusted browsing
//! context (parent, iframes, sibling windows) plus the local one. Incoming
//! messages are dropped unless their declared origin is on the configured
//! allow-list; that filter is a security boundary and is never relaxed.
//!
//! The transport is abstracted so hosts can plug in platform messaging
//! (browser cross-window postMessage) without touching broadcaster logic;
//! [`InProcessTransport`] serves non-browser hosts and tests.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::errors::Result;

// =============================================================================
// Event kinds
// =============================================================================

/// Authentication lifecycle events exchanged between contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A context completed a login.
    LoginSuccess,
    /// A context completed a logout.
    LogoutSuccess,
    /// A fresh access token was acquired (login or silent renewal).
    TokenAcquired,
    /// Silent renewal failed; interaction is needed.
    TokenExpired,
    /// The active user profile changed (demo user switch).
    UserProfileUpdated,
    /// An authentication attempt failed.
    AuthError,
}

impl EventKind {
    /// The name carried on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::LoginSuccess => "mfe:auth:login:success",
            Self::LogoutSuccess => "mfe:auth:logout:success",
            Self::TokenAcquired => "mfe:auth:token:acquired",
            Self::TokenExpired => "mfe:auth:token:expired",
            Self::UserProfileUpdated => "mfe:auth:profile:updated",
            Self::AuthError => "mfe:auth:error",
        }
    }

    /// Parse a wire name. Unknown names are not an error; foreign messages
    /// on a shared channel are simply not ours.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "mfe:auth:login:success" => Some(Self::LoginSuccess),
            "mfe:auth:logout:success" => Some(Self::LogoutSuccess),
            "mfe:auth:token:acquired" => Some(Self::TokenAcquired),
            "mfe:auth:token:expired" => Some(Self::TokenExpired),
            "mfe:auth:profile:updated" => Some(Self::UserProfileUpdated),
            "mfe:auth:error" => Some(Self::AuthError),
            _ => None,
        }
    }
}

// =============================================================================
// Wire message
// =============================================================================

/// Message posted between browsing contexts. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Event kind wire name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Milliseconds since epoch at publish time.
    pub timestamp: i64,
    /// Declared origin of the publishing context.
    pub origin: String,
}

// =============================================================================
// Transport
// =============================================================================

/// A fan-out message channel linking browsing contexts.
pub trait BroadcastTransport: Send + Sync {
    /// Deliver a message to every attached context, including the sender's.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::AuthError::Network`] if the channel is gone.
    fn send(&self, message: WireMessage) -> Result<()>;

    /// A receiver observing every message sent after this call.
    fn receiver(&self) -> broadcast::Receiver<WireMessage>;
}

/// In-process [`BroadcastTransport`] over a tokio broadcast channel.
///
/// Cloning attaches another context to the same channel.
#[derive(Clone)]
pub struct InProcessTransport {
    tx: broadcast::Sender<WireMessage>,
}

impl InProcessTransport {
    /// Create a channel with room for a burst of in-flight events.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastTransport for InProcessTransport {
    fn send(&self, message: WireMessage) -> Result<()> {
        // A send with no live receivers is fine; nobody is composed yet.
        let _ = self.tx.send(message);
        Ok(())
    }

    fn receiver(&self) -> broadcast::Receiver<WireMessage> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

type Handler = Arc<dyn Fn(&WireMessage) + Send + Sync>;

/// Publishes and dispatches authentication events for one browsing context.
pub struct Broadcaster {
    transport: Arc<dyn BroadcastTransport>,
    local_origin: String,
    handlers: Arc<Mutex<Vec<(EventKind, Handler)>>>,
    dispatch: JoinHandle<()>,
}

impl Broadcaster {
    /// Attach to a transport. Must be called within a tokio runtime; a
    /// background task dispatches incoming messages until the broadcaster
    /// is dropped.
    #[must_use]
    pub fn new(
        transport: Arc<dyn BroadcastTransport>,
        local_origin: impl Into<String>,
        allowed_origins: Vec<String>,
    ) -> Self {
        let local_origin = local_origin.into();
        let handlers: Arc<Mutex<Vec<(EventKind, Handler)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut rx = transport.receiver();
        let dispatch_handlers = handlers.clone();
        let dispatch = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        dispatch_message(&message, &allowed_origins, &dispatch_handlers);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "session_core.broadcast",
                            skipped,
                            "Broadcast receiver lagged; auth events dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            transport,
            local_origin,
            handlers,
            dispatch,
        }
    }

    /// Publish an event to every attached context (the local one included).
    pub fn publish(&self, kind: EventKind, payload: Option<serde_json::Value>) {
        let message = WireMessage {
            kind: kind.wire_name().to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
            origin: self.local_origin.clone(),
        };

        tracing::debug!(
            target: "session_core.broadcast",
            kind = kind.wire_name(),
            "Publishing auth event"
        );

        if let Err(e) = self.transport.send(message) {
            tracing::warn!(target: "session_core.broadcast", error = %e, "Failed to publish auth event");
        }
    }

    /// Register a handler for one event kind. Handlers only ever see
    /// messages whose origin passed the allow-list.
    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(&WireMessage) + Send + Sync + 'static) {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.push((kind, Arc::new(handler)));
    }
}

fn dispatch_message(
    message: &WireMessage,
    allowed_origins: &[String],
    handlers: &Mutex<Vec<(EventKind, Handler)>>,
) {
    if !allowed_origins.iter().any(|o| o == &message.origin) {
        tracing::debug!(
            target: "session_core.broadcast",
            origin = %message.origin,
            "Discarding auth message from unlisted origin"
        );
        return;
    }

    let Some(kind) = EventKind::from_wire(&message.kind) else {
        return;
    };

    let matching: Vec<Handler> = {
        let handlers = handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| h.clone())
            .collect()
    };

    for handler in matching {
        handler(message);
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("local_origin", &self.local_origin)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
