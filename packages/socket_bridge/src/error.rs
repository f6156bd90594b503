use thiserror::Error;

/// Errors produced while decoding or encoding bridge frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The inbound client frame was not valid JSON. The display text is the
    /// exact message sent back to the client.
    #[error("invalid payload")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors surfaced by a backend connection handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The connection is not in the `Open` ready state.
    #[error("backend connection is not open")]
    NotOpen,
    /// The transport driving this connection has gone away.
    #[error("backend connection driver has stopped")]
    Disconnected,
}

/// Errors from talking to a session or the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("session has been closed")]
    SessionClosed,
    #[error("no session registered for client {0}")]
    UnknownClient(u64),
}
