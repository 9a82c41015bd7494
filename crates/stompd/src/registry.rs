//! Client registry and broadcast fan-out.
//!
//! Clients (browser pages, the desktop app) attach and detach at any time.
//! The registry is the single owner of the membership list; everything else
//! reaches it through attach/detach/broadcast.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

/// One attached client connection.
///
/// Purely a broadcast destination; connections own no session state.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    /// Stable identity for attach/detach bookkeeping.
    fn id(&self) -> Uuid;

    /// Deliver one message to this client.
    async fn send(&self, message: &str) -> Result<(), ClientSendError>;
}

#[derive(Debug, thiserror::Error)]
#[error("client send failed: {0}")]
pub struct ClientSendError(pub String);

/// Sink for engine messages that fan out to every attached client.
///
/// Installed into the engine once, during the first client attach.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &str);
}

/// Ordered set of attached clients.
///
/// Membership changes only through [`attach`](Self::attach) and
/// [`detach`](Self::detach). Broadcast walks a snapshot taken at call time,
/// in attachment order; clients attaching mid-broadcast see only later
/// messages.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<Vec<Arc<dyn ClientConnection>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, connection: Arc<dyn ClientConnection>) {
        let mut clients = self.clients.lock().unwrap();
        clients.push(connection.clone());
        debug!(client = %connection.id(), total = clients.len(), "client attached");
    }

    pub fn detach(&self, id: Uuid) {
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|c| c.id() != id);
        if clients.len() < before {
            debug!(client = %id, total = clients.len(), "client detached");
        } else {
            warn!(client = %id, "detach for unknown client");
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn ClientConnection>> {
        self.clients.lock().unwrap().clone()
    }

    /// Best-effort fan-out: a failed delivery is logged and skipped, it never
    /// aborts delivery to the remaining clients.
    pub async fn broadcast(&self, message: &str) {
        for connection in self.snapshot() {
            if let Err(e) = connection.send(message).await {
                warn!(client = %connection.id(), error = %e, "skipping client in broadcast");
            }
        }
    }
}

#[async_trait]
impl MessageSink for ClientRegistry {
    async fn deliver(&self, message: &str) {
        self.broadcast(message).await;
    }
}
