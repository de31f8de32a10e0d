//! `WebSocket` handler for real-time tick diff streaming.
//!
//! Clients connect to `GET /ws/diffs` and receive a JSON-encoded
//! [`TickDiff`](pandemos_types::TickDiff) each time the scheduler
//! commits a tick. The handler uses a [`broadcast::Receiver`] so all
//! connected clients see the same stream.
//!
//! If a client falls behind, lagged messages are silently skipped and
//! the client resumes from the most recent diff. A slow consumer never
//! delays the tick cycle or other subscribers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming tick diffs.
///
/// # Route
///
/// `GET /ws/diffs`
pub async fn ws_diffs(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: subscribe to the diff channel and
/// forward each committed diff as a text frame.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            // Receive a committed diff from the scheduler.
            result = rx.recv() => {
                match result {
                    Ok(diff) => {
                        let json = match serde_json::to_string(&diff) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize tick diff: {e}");
                                continue;
                            }
                        };
                        let msg: Message = Message::Text(json.into());
                        if socket.send(msg).await.is_err() {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            // Check if the client sent a close frame or disconnected.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let pong = Message::Pong(data);
                        if socket.send(pong).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {
                        // Ignore other message types (text, binary from client).
                    }
                }
            }
        }
    }
}
