use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::BackendFactory;
use crate::error::BridgeError;
use crate::metrics::BridgeMetrics;
use crate::session::{ClientId, ClientOutbox, SessionHandle, SessionSettings, spawn_session};

/// Maps each connected client to its session. The only place a session can
/// be found from outside its actor.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ClientId, SessionHandle>>,
    next_id: AtomicU64,
    factory: Arc<dyn BackendFactory>,
    settings: SessionSettings,
    metrics: Arc<BridgeMetrics>,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        settings: SessionSettings,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            factory,
            settings,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.metrics
    }

    /// Register a newly connected client. Frames for the client are written
    /// to `outbox`.
    pub async fn connect(&self, outbox: ClientOutbox) -> SessionHandle {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handle = spawn_session(
            id,
            outbox,
            self.factory.clone(),
            self.settings.clone(),
            self.metrics.clone(),
        );

        self.sessions.write().await.insert(id, handle.clone());
        self.metrics.session_opened();
        info!(client = %id, "Client connected");
        handle
    }

    pub async fn get(&self, id: ClientId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Deliver an inbound frame to the client's session.
    pub async fn dispatch(&self, id: ClientId, frame: String) -> Result<(), BridgeError> {
        let handle = self
            .get(id)
            .await
            .ok_or(BridgeError::UnknownClient(id.0))?;
        handle.send_frame(frame).await
    }

    /// Tear down the client's session. Returns false when there was nothing
    /// to tear down, so repeated calls are harmless.
    pub async fn disconnect(&self, id: ClientId) -> bool {
        let Some(handle) = self.sessions.write().await.remove(&id) else {
            debug!(client = %id, "Disconnect for unknown or already removed client");
            return false;
        };
        self.metrics.session_closed();
        if handle.disconnect().await.is_err() {
            debug!(client = %id, "Session actor already stopped");
        }
        info!(client = %id, "Client disconnected");
        true
    }

    /// Tear down every session. Used on server shutdown.
    pub async fn shutdown_all(&self) -> usize {
        let ids: Vec<ClientId> = self.sessions.read().await.keys().copied().collect();
        let mut closed = 0;
        for id in ids {
            if self.disconnect(id).await {
                closed += 1;
            }
        }
        closed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
