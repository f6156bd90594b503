//! WebSocket transport for backend connections.

use futures::{SinkExt, StreamExt};
use socket_bridge::{
    BackendCommand, BackendConnection, BackendDriver, BackendFactory, backend_channel,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Backend events buffered per connection before the driver waits on the session.
const EVENT_CAPACITY: usize = 64;

/// Opens one WebSocket client connection to the backend per `create` call.
pub struct WsBackendFactory {
    url: String,
}

impl WsBackendFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl BackendFactory for WsBackendFactory {
    fn create(&self) -> BackendConnection {
        let (conn, driver) = backend_channel(EVENT_CAPACITY);
        tokio::spawn(drive_backend(self.url.clone(), driver));
        conn
    }
}

async fn drive_backend(url: String, mut driver: BackendDriver) {
    debug!("Connecting to backend at {}", url);

    // Only a close (or the session going away) can arrive before open
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => Some(result),
        _ = driver.next_command() => None,
    };

    let stream = match connected {
        None => {
            debug!("Backend connect to {} abandoned", url);
            driver.closed().await;
            return;
        }
        Some(Err(e)) => {
            warn!("Failed to connect to backend {}: {}", url, e);
            driver.error(e.to_string()).await;
            driver.closed().await;
            return;
        }
        Some(Ok((stream, _response))) => stream,
    };

    let (mut sink, mut source) = stream.split();

    if !driver.opened().await {
        debug!("Backend {} opened after close was requested", url);
        let _ = sink.close().await;
        driver.closed().await;
        return;
    }
    debug!("Backend connection to {} open", url);

    loop {
        tokio::select! {
            command = driver.next_command() => match command {
                Some(BackendCommand::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!("Failed to send to backend: {}", e);
                        driver.error(e.to_string()).await;
                        break;
                    }
                }
                Some(BackendCommand::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !driver.message(text.as_str().to_owned()).await {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if !driver.message(String::from_utf8_lossy(&data).into_owned()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Backend closed the connection");
                    break;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Backend connection error: {}", e);
                    driver.error(e.to_string()).await;
                    break;
                }
                None => break,
            },
        }
    }

    driver.closed().await;
}
