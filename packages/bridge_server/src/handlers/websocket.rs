use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::AppState;

/// Upgrade a client connection and bridge it until either side goes away.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state))
}

async fn handle_client_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<String>(state.outbox_capacity);

    let session = state.registry.connect(outbox).await;
    let client = session.id();

    // Frames from the session (backend replies, notifications) -> client
    let send_task = async move {
        while let Some(frame) = outbox_rx.recv().await {
            if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
                debug!(%client, "Failed to write to client: {}", e);
                break;
            }
        }
    };

    // Client -> session
    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            let frame = match msg {
                Ok(Message::Text(text)) => text.as_str().to_owned(),
                Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
                Ok(Message::Close(_)) => {
                    debug!(%client, "Client closed the connection");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(%client, "WebSocket error: {}", e);
                    break;
                }
            };

            if session.send_frame(frame).await.is_err() {
                debug!(%client, "Session ended while client was sending");
                break;
            }
        }
    };

    tokio::select! {
        _ = send_task => {},
        _ = input_task => {},
    }

    state.registry.disconnect(client).await;
}
