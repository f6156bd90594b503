//! Socket Bridge - per-client relay between a front-facing connection and a
//! backend connection.
//!
//! Each client gets a session actor that owns at most one backend connection
//! at a time. Client frames are decoded, forwarded to the backend (reusing the
//! connection while it stays open), and backend replies are passed back
//! verbatim. Backend lifecycle events become `info`/`error` notifications.
//!
//! The crate knows nothing about HTTP or any concrete backend transport:
//! listeners call into [`SessionRegistry`], and transports implement
//! [`BackendFactory`] using a [`BackendDriver`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use socket_bridge::{
//!     BackendConnection, BackendFactory, BridgeMetrics, SessionRegistry, SessionSettings,
//!     backend_channel,
//! };
//!
//! struct NullBackend;
//!
//! impl BackendFactory for NullBackend {
//!     fn create(&self) -> BackendConnection {
//!         let (conn, _driver) = backend_channel(16);
//!         conn
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SessionRegistry::new(
//!         Arc::new(NullBackend),
//!         SessionSettings::default(),
//!         Arc::new(BridgeMetrics::new()),
//!     );
//!
//!     let (outbox, mut frames) = tokio::sync::mpsc::channel(64);
//!     let session = registry.connect(outbox).await;
//!     registry
//!         .dispatch(session.id(), r#"{"text":"hello"}"#.to_string())
//!         .await
//!         .unwrap();
//!
//!     while let Some(frame) = frames.recv().await {
//!         println!("to client: {frame}");
//!     }
//!     registry.disconnect(session.id()).await;
//! }
//! ```

pub mod backend;
pub mod codec;
mod error;
pub mod metrics;
mod registry;
mod session;
#[cfg(test)]
mod test_helpers;

pub use backend::{
    BackendCommand, BackendConnection, BackendDriver, BackendEvent, BackendFactory, ReadyState,
    backend_channel,
};
pub use codec::{Notification, RequestPayload};
pub use error::{BackendError, BridgeError, CodecError};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use registry::SessionRegistry;
pub use session::{ClientId, ClientOutbox, SessionHandle, SessionSettings, SessionState};
