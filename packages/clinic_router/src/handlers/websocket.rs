use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::ws;

/// Upgrade to the participant WebSocket
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let router = state.router.clone();
    let metrics = state.metrics.clone();
    let send_capacity = state.config.server.send_channel_capacity;

    ws.on_upgrade(move |socket| ws::handle_connection(socket, router, metrics, send_capacity))
}
