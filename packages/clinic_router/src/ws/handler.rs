//! WebSocket Handler
//!
//! One task pair per connection: the sender drains the outbound queue into
//! the socket, the input loop parses envelopes and hands them to the router.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::ServerMetrics;
use crate::router::{ConnectionHandle, RouterHandle};

use super::protocol::{ClientMessage, ServerMessage};

/// Parse one inbound frame.
pub fn parse_frame(bytes: &[u8]) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Handle a client WebSocket connection until either side closes it.
pub async fn handle_connection(
    socket: WebSocket,
    router: RouterHandle,
    metrics: Arc<ServerMetrics>,
    send_capacity: usize,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "WebSocket connected");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to the WebSocket
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(send_capacity);
    // Cancelled by the router when another connection takes over this participant
    let close = CancellationToken::new();
    let handle = ConnectionHandle::new(connection_id.clone(), tx, close.clone());

    // Task to send messages to WebSocket
    let sender_close = close.clone();
    let sender_conn = connection_id.clone();
    let sender_task = async move {
        loop {
            let msg = tokio::select! {
                _ = sender_close.cancelled() => {
                    debug!(conn_id = %sender_conn, "superseded, closing socket");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming messages
    let input_router = router.clone();
    let input_metrics = metrics.clone();
    let input_conn = connection_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            let parsed = match msg {
                Ok(Message::Text(text)) => parse_frame(text.as_bytes()),
                Ok(Message::Binary(bytes)) => parse_frame(&bytes),
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %input_conn, "Client closed connection");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(conn_id = %input_conn, "WebSocket error: {}", e);
                    break;
                }
            };
            input_metrics.message_received();
            match parsed {
                Ok(client_msg) => {
                    if input_router.inbound(handle.clone(), client_msg).await.is_err() {
                        error!(conn_id = %input_conn, "router is gone, closing connection");
                        break;
                    }
                }
                Err(e) => {
                    input_metrics.message_malformed();
                    warn!(conn_id = %input_conn, error = %e, "ignoring malformed message");
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %connection_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %connection_id, "Input task ended"),
    }

    close.cancel();
    if let Err(e) = router.disconnected(connection_id.clone()).await {
        warn!(conn_id = %connection_id, "Failed to notify router of disconnect: {}", e);
    }
    metrics.connection_closed();
    info!(conn_id = %connection_id, "WebSocket disconnected");
}
