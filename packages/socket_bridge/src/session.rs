use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendConnection, BackendEvent, BackendFactory, ReadyState};
use crate::codec::{
    BACKEND_CLOSED, BACKEND_ERROR, CONNECT_TIMED_OUT, Notification, decode_client_frame,
    encode_request,
};
use crate::error::BridgeError;
use crate::metrics::BridgeMetrics;

/// Identifies one client connection for its whole lifetime.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Client-bound text frames. The listener drains this into the socket.
pub type ClientOutbox = mpsc::Sender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No backend connection
    Idle,
    /// Backend requested, not yet open
    Connecting,
    /// Backend open; requests are forwarded directly
    BackendOpen,
    /// Client gone, everything released
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How long a backend may stay `Connecting` (None = wait forever)
    pub connect_timeout: Option<Duration>,
    /// Queued inbound commands per session
    pub command_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            command_capacity: 64,
        }
    }
}

/// Messages that can be sent to a session actor
#[derive(Debug)]
pub enum SessionCommand {
    ClientFrame {
        frame: String,
    },
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
    Disconnect {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to communicate with a session actor
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: ClientId,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Deliver a raw inbound client frame.
    pub async fn send_frame(&self, frame: String) -> Result<(), BridgeError> {
        self.sender
            .send(SessionCommand::ClientFrame { frame })
            .await
            .map_err(|_| BridgeError::SessionClosed)
    }

    pub async fn state(&self) -> Result<SessionState, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::GetState { respond_to: tx })
            .await
            .map_err(|_| BridgeError::SessionClosed)?;
        rx.await.map_err(|_| BridgeError::SessionClosed)
    }

    /// Tear the session down and wait until its backend has been released.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Disconnect { respond_to: tx })
            .await
            .map_err(|_| BridgeError::SessionClosed)?;
        rx.await.map_err(|_| BridgeError::SessionClosed)
    }
}

/// The backend connection a session currently owns.
struct ActiveBackend {
    generation: u64,
    conn: BackendConnection,
    /// Request waiting for the connection to open
    pending: Option<String>,
}

enum Step {
    Command(Option<SessionCommand>),
    Backend(Option<BackendEvent>),
    ConnectTimeout,
}

/// Owns one client's bridge state. Every event for the session is handled
/// here, one at a time.
struct SessionActor {
    id: ClientId,
    receiver: mpsc::Receiver<SessionCommand>,
    outbox: ClientOutbox,
    factory: Arc<dyn BackendFactory>,
    settings: SessionSettings,
    metrics: Arc<BridgeMetrics>,
    backend: Option<ActiveBackend>,
    state: SessionState,
    connect_deadline: Option<Instant>,
    generation: u64,
}

/// Spawn a session actor for a newly connected client.
pub fn spawn_session(
    id: ClientId,
    outbox: ClientOutbox,
    factory: Arc<dyn BackendFactory>,
    settings: SessionSettings,
    metrics: Arc<BridgeMetrics>,
) -> SessionHandle {
    let (sender, receiver) = mpsc::channel(settings.command_capacity.max(1));
    let actor = SessionActor {
        id,
        receiver,
        outbox,
        factory,
        settings,
        metrics,
        backend: None,
        state: SessionState::Idle,
        connect_deadline: None,
        generation: 0,
    };
    tokio::spawn(actor.run());
    SessionHandle { id, sender }
}

async fn next_backend_event(backend: &mut Option<ActiveBackend>) -> Option<BackendEvent> {
    match backend {
        Some(active) => active.conn.next_event().await,
        None => std::future::pending().await,
    }
}

async fn connect_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self) {
        debug!(client = %self.id, "Session actor started");

        loop {
            let step = tokio::select! {
                command = self.receiver.recv() => Step::Command(command),
                event = next_backend_event(&mut self.backend) => Step::Backend(event),
                () = connect_deadline(self.connect_deadline) => Step::ConnectTimeout,
            };

            match step {
                Step::Command(Some(SessionCommand::ClientFrame { frame })) => {
                    self.handle_client_frame(frame).await;
                }
                Step::Command(Some(SessionCommand::GetState { respond_to })) => {
                    self.refresh_state();
                    let _ = respond_to.send(self.state);
                }
                Step::Command(Some(SessionCommand::Disconnect { respond_to })) => {
                    self.teardown();
                    let _ = respond_to.send(());
                    break;
                }
                Step::Command(None) => {
                    // Every handle dropped without an explicit disconnect
                    self.teardown();
                    break;
                }
                Step::Backend(event) => self.handle_backend_event(event).await,
                Step::ConnectTimeout => self.handle_connect_timeout().await,
            }
        }

        debug!(client = %self.id, "Session actor shutting down");
    }

    async fn handle_client_frame(&mut self, frame: String) {
        let request = match decode_client_frame(&frame) {
            Ok(request) => request,
            Err(e) => {
                debug!(client = %self.id, "Rejecting client frame: {}", e);
                self.metrics.decode_error();
                self.notify(Notification::error(e.to_string())).await;
                return;
            }
        };

        // Observe anything the backend already reported before deciding on reuse
        self.drain_backend_events().await;

        if self.backend.as_ref().is_some_and(|b| b.conn.is_open()) {
            self.forward_request(&request.text);
            return;
        }

        if let Some(stale) = self.backend.take() {
            self.discard_backend(stale).await;
        }
        self.open_backend(request.text);
    }

    fn open_backend(&mut self, text: String) {
        self.generation += 1;
        let conn = self.factory.create();
        self.metrics.backend_created();
        info!(
            client = %self.id,
            generation = self.generation,
            "Opening backend connection"
        );

        self.backend = Some(ActiveBackend {
            generation: self.generation,
            conn,
            pending: Some(text),
        });
        self.state = SessionState::Connecting;
        self.connect_deadline = self
            .settings
            .connect_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
    }

    /// Release a backend that cannot be reused.
    async fn discard_backend(&mut self, stale: ActiveBackend) {
        match stale.conn.ready_state() {
            ReadyState::Connecting => {
                warn!(
                    client = %self.id,
                    generation = stale.generation,
                    "New request while backend still connecting; dropping the pending request"
                );
                self.metrics.backend_superseded();
                self.close_quietly(&stale);
            }
            ReadyState::Closed => {
                // Closed remotely; its close event never made it through
                info!(
                    client = %self.id,
                    generation = stale.generation,
                    "Backend connection closed"
                );
                self.notify(Notification::info(BACKEND_CLOSED)).await;
            }
            ReadyState::Open | ReadyState::Closing => self.close_quietly(&stale),
        }
        self.metrics.backend_released();
        self.state = SessionState::Idle;
        self.connect_deadline = None;
    }

    fn forward_request(&self, text: &str) {
        let Some(active) = self.backend.as_ref() else {
            return;
        };
        let payload = match encode_request(text) {
            Ok(payload) => payload,
            Err(e) => {
                error!(client = %self.id, "Failed to encode request: {}", e);
                return;
            }
        };
        match active.conn.send(payload) {
            Ok(()) => {
                self.metrics.request_forwarded();
                debug!(
                    client = %self.id,
                    generation = active.generation,
                    "Forwarded request to backend"
                );
            }
            Err(e) => warn!(
                client = %self.id,
                generation = active.generation,
                "Dropping request, backend send failed: {}",
                e
            ),
        }
    }

    async fn drain_backend_events(&mut self) {
        loop {
            let Some(active) = self.backend.as_mut() else {
                return;
            };
            let Some(event) = active.conn.try_next_event() else {
                return;
            };
            self.handle_backend_event(event).await;
        }
    }

    async fn handle_backend_event(&mut self, event: Option<BackendEvent>) {
        match event {
            Some(BackendEvent::Open) => self.on_backend_open(),
            Some(BackendEvent::Message(text)) => {
                self.metrics.reply_forwarded();
                self.send_to_client(text).await;
            }
            Some(BackendEvent::Error(reason)) => {
                // The close that usually follows does the Idle transition
                warn!(client = %self.id, "Backend socket error: {}", reason);
                self.metrics.backend_error();
                self.notify(Notification::error(BACKEND_ERROR)).await;
            }
            Some(BackendEvent::Close) | None => self.on_backend_closed().await,
        }
    }

    fn on_backend_open(&mut self) {
        self.connect_deadline = None;
        let Some(active) = self.backend.as_mut() else {
            return;
        };
        let pending = active.pending.take();
        info!(
            client = %self.id,
            generation = active.generation,
            "Backend connection open"
        );
        self.state = SessionState::BackendOpen;
        if let Some(text) = pending {
            self.forward_request(&text);
        }
    }

    async fn on_backend_closed(&mut self) {
        if let Some(active) = self.backend.take() {
            info!(
                client = %self.id,
                generation = active.generation,
                "Backend connection closed"
            );
            self.metrics.backend_released();
        }
        self.state = SessionState::Idle;
        self.connect_deadline = None;
        self.notify(Notification::info(BACKEND_CLOSED)).await;
    }

    async fn handle_connect_timeout(&mut self) {
        self.connect_deadline = None;
        let Some(active) = self.backend.take() else {
            return;
        };

        if active.conn.ready_state() != ReadyState::Connecting {
            // It resolved in the meantime; let the queued events speak
            self.backend = Some(active);
            self.drain_backend_events().await;
            return;
        }

        warn!(
            client = %self.id,
            generation = active.generation,
            "Backend connection did not open within {:?}",
            self.settings.connect_timeout.unwrap_or_default()
        );
        self.metrics.connect_timeout();
        self.close_quietly(&active);
        self.metrics.backend_released();
        self.state = SessionState::Idle;
        self.notify(Notification::error(CONNECT_TIMED_OUT)).await;
    }

    fn teardown(&mut self) {
        if let Some(active) = self.backend.take() {
            debug!(
                client = %self.id,
                generation = active.generation,
                "Closing backend for disconnected client"
            );
            self.close_quietly(&active);
            self.metrics.backend_released();
        }
        self.state = SessionState::Closed;
        self.connect_deadline = None;
        info!(client = %self.id, "Session closed");
    }

    /// Close a backend, logging rather than surfacing any failure.
    fn close_quietly(&self, active: &ActiveBackend) {
        if let Err(e) = active.conn.close() {
            warn!(
                client = %self.id,
                generation = active.generation,
                "Error closing backend socket: {}",
                e
            );
        }
    }

    /// Keep `BackendOpen` honest when the handle stopped being open.
    fn refresh_state(&mut self) {
        if self.state == SessionState::BackendOpen
            && !self.backend.as_ref().is_some_and(|b| b.conn.is_open())
        {
            self.state = SessionState::Idle;
        }
    }

    async fn notify(&self, notification: Notification) {
        match notification.encode() {
            Ok(json) => {
                debug!(client = %self.id, "Notifying client: {}", notification.message());
                self.metrics.notification_sent();
                self.send_to_client(json).await;
            }
            Err(e) => error!(client = %self.id, "Failed to encode notification: {}", e),
        }
    }

    async fn send_to_client(&self, frame: String) {
        if self.outbox.send(frame).await.is_err() {
            debug!(client = %self.id, "Client outbox closed, dropping frame");
        }
    }
}
