//! In-memory backend used by the bridge tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

use crate::backend::{BackendConnection, BackendDriver, BackendFactory, backend_channel};
use crate::codec::Notification;

/// Timeout for each async wait in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands out channel-backed connections and keeps their drivers so a test can
/// play the backend's part.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    drivers: Arc<Mutex<VecDeque<BackendDriver>>>,
    created: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Wait for the next connection the bridge creates.
    pub async fn next_driver(&self) -> BackendDriver {
        tokio::time::timeout(TEST_TIMEOUT, async {
            loop {
                let notified = self.notify.notified();
                if let Some(driver) = self.drivers.lock().unwrap().pop_front() {
                    return driver;
                }
                notified.await;
            }
        })
        .await
        .expect("no backend connection was created")
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(&self) -> BackendConnection {
        let (conn, driver) = backend_channel(16);
        self.drivers.lock().unwrap().push_back(driver);
        self.created.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        conn
    }
}

pub async fn recv_frame(client: &mut mpsc::Receiver<String>) -> String {
    tokio::time::timeout(TEST_TIMEOUT, client.recv())
        .await
        .expect("timed out waiting for a client frame")
        .expect("client outbox closed")
}

pub async fn recv_notification(client: &mut mpsc::Receiver<String>) -> Notification {
    let frame = recv_frame(client).await;
    serde_json::from_str(&frame).unwrap_or_else(|_| panic!("not a notification: {frame}"))
}

/// Assert nothing reaches the client for a short while.
pub async fn assert_no_frame(client: &mut mpsc::Receiver<String>) {
    if let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(100), client.recv()).await
    {
        panic!("unexpected client frame: {frame}");
    }
}
