//! Backend connection contract.
//!
//! A [`BackendFactory`] hands out [`BackendConnection`]s. The bridge only ever
//! sees the handle side: it can send text, close, check readiness and read the
//! connection's lifecycle events. Transports implement the other half with a
//! [`BackendDriver`], obtained from [`backend_channel`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BackendError;

/// Lifecycle events emitted by a backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Open,
    Message(String),
    Close,
    Error(String),
}

/// Commands a handle issues to its transport driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    Send(String),
    Close,
}

/// Mirrors the WebSocket `readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Clone)]
struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ReadyState::Connecting as u8)))
    }

    fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `to` only when currently `from`.
    fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Creates backend connections. Address and transport are the factory's
/// business; the bridge depends on nothing else.
pub trait BackendFactory: Send + Sync + 'static {
    /// Start a new connection. Returns immediately in the `Connecting` state;
    /// the outcome arrives as `Open`, or `Error` followed by `Close`.
    fn create(&self) -> BackendConnection;
}

/// The bridge-side handle of one backend connection.
#[derive(Debug)]
pub struct BackendConnection {
    commands: mpsc::UnboundedSender<BackendCommand>,
    events: mpsc::Receiver<BackendEvent>,
    ready: SharedReadyState,
}

impl BackendConnection {
    pub fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Send a text frame. Fails unless the connection is open.
    pub fn send(&self, text: String) -> Result<(), BackendError> {
        if !self.is_open() {
            return Err(BackendError::NotOpen);
        }
        self.commands
            .send(BackendCommand::Send(text))
            .map_err(|_| BackendError::Disconnected)
    }

    /// Ask the transport to close. A no-op once closing or closed.
    pub fn close(&self) -> Result<(), BackendError> {
        let requested = self
            .ready
            .transition(ReadyState::Open, ReadyState::Closing)
            || self
                .ready
                .transition(ReadyState::Connecting, ReadyState::Closing);
        if !requested {
            return Ok(());
        }
        self.commands.send(BackendCommand::Close).map_err(|_| {
            self.ready.set(ReadyState::Closed);
            BackendError::Disconnected
        })
    }

    /// Wait for the next lifecycle event. `None` once the driver is gone.
    pub async fn next_event(&mut self) -> Option<BackendEvent> {
        self.events.recv().await
    }

    /// Take an already-queued event without waiting.
    ///
    /// `Some(None)` means the driver is gone; `None` means nothing is queued.
    pub fn try_next_event(&mut self) -> Option<Option<BackendEvent>> {
        match self.events.try_recv() {
            Ok(event) => Some(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(None),
        }
    }
}

/// The transport side of a backend connection.
#[derive(Debug)]
pub struct BackendDriver {
    commands: mpsc::UnboundedReceiver<BackendCommand>,
    events: mpsc::Sender<BackendEvent>,
    ready: SharedReadyState,
}

impl BackendDriver {
    /// Next command from the handle. `None` once the handle is dropped.
    pub async fn next_command(&mut self) -> Option<BackendCommand> {
        self.commands.recv().await
    }

    /// Report a successful open. Ignored if the bridge already asked to close.
    pub async fn opened(&self) -> bool {
        if !self
            .ready
            .transition(ReadyState::Connecting, ReadyState::Open)
        {
            debug!("Backend opened after close was requested");
            return false;
        }
        self.emit(BackendEvent::Open).await
    }

    pub async fn message(&self, text: String) -> bool {
        self.emit(BackendEvent::Message(text)).await
    }

    pub async fn error(&self, reason: impl Into<String>) -> bool {
        self.emit(BackendEvent::Error(reason.into())).await
    }

    /// Report the connection closed. Consumes the driver: nothing follows a close.
    pub async fn closed(self) {
        self.ready.set(ReadyState::Closed);
        let _ = self.events.send(BackendEvent::Close).await;
    }

    /// Returns false when the bridge no longer listens.
    async fn emit(&self, event: BackendEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

/// Build a connected handle/driver pair, starting in `Connecting`.
pub fn backend_channel(event_capacity: usize) -> (BackendConnection, BackendDriver) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
    let ready = SharedReadyState::new();

    let connection = BackendConnection {
        commands: command_tx,
        events: event_rx,
        ready: ready.clone(),
    };
    let driver = BackendDriver {
        commands: command_rx,
        events: event_tx,
        ready,
    };
    (connection, driver)
}
