//! Bridge metrics for observability
//!
//! Counters are updated from session actors and read by the server's
//! health and metrics endpoints.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Bridge-wide counters
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    // Session metrics
    /// Currently registered client sessions
    pub active_sessions: AtomicU64,
    /// Sessions registered since start
    pub total_sessions: AtomicU64,

    // Backend metrics
    /// Backend connections requested from the factory
    pub backend_connections_created: AtomicU64,
    /// Backend connections released (closed remotely or torn down)
    pub backend_connections_closed: AtomicU64,
    /// Pending connections replaced by a newer client frame
    pub backend_connections_superseded: AtomicU64,

    // Message metrics
    /// Requests forwarded to a backend
    pub requests_forwarded: AtomicU64,
    /// Raw backend replies forwarded to clients
    pub replies_forwarded: AtomicU64,
    /// Info/error notifications sent to clients
    pub notifications_sent: AtomicU64,

    // Error metrics
    /// Client frames that failed to decode
    pub decode_errors: AtomicU64,
    /// Errors reported by backend connections
    pub backend_errors: AtomicU64,
    /// Backend connections that did not open in time
    pub connect_timeouts: AtomicU64,

    start_time: Option<Instant>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn backend_created(&self) {
        self.backend_connections_created
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn backend_released(&self) {
        self.backend_connections_closed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn backend_superseded(&self) {
        self.backend_connections_superseded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_forwarded(&self) {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reply_forwarded(&self) {
        self.replies_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_timeout(&self) {
        self.connect_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            sessions: SessionMetrics {
                active: self.active_sessions.load(Ordering::Relaxed),
                total: self.total_sessions.load(Ordering::Relaxed),
            },
            backend: BackendMetrics {
                created: self.backend_connections_created.load(Ordering::Relaxed),
                closed: self.backend_connections_closed.load(Ordering::Relaxed),
                superseded: self.backend_connections_superseded.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
                replies_forwarded: self.replies_forwarded.load(Ordering::Relaxed),
                notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                decode: self.decode_errors.load(Ordering::Relaxed),
                backend: self.backend_errors.load(Ordering::Relaxed),
                connect_timeouts: self.connect_timeouts.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub sessions: SessionMetrics,
    pub backend: BackendMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendMetrics {
    pub created: u64,
    pub closed: u64,
    pub superseded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub requests_forwarded: u64,
    pub replies_forwarded: u64,
    pub notifications_sent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub decode: u64,
    pub backend: u64,
    pub connect_timeouts: u64,
}

impl MetricsSnapshot {
    /// Healthy until a backend has misbehaved.
    pub fn is_healthy(&self) -> bool {
        self.errors.backend == 0 && self.errors.connect_timeouts == 0
    }
}
