//! Block signal stream for the companion client.
//!
//! On connect the client receives the current `{"block": bool}` and then
//! every block change the dispatcher broadcasts.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use drivesafe_core::BlockSignal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade to a WebSocket that streams block signals.
pub async fn block_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_blocks(socket, state))
}

async fn stream_blocks(mut socket: WebSocket, state: AppState) {
    // Subscribe before reading the current value so no change is lost.
    let mut blocks = state.dispatcher().subscribe();
    if send_current(&mut socket, &state).await.is_err() {
        return;
    }
    debug!("Block stream client connected");

    loop {
        tokio::select! {
            received = blocks.recv() => match received {
                Ok(signal) => {
                    if send_signal(&mut socket, signal).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Block stream client lagged, resending current state");
                    if send_current(&mut socket, &state).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Block stream client disconnected");
}

async fn send_current(socket: &mut WebSocket, state: &AppState) -> Result<(), axum::Error> {
    let signal = BlockSignal {
        block: state.detection().blocked().await,
    };
    send_signal(socket, signal).await
}

async fn send_signal(socket: &mut WebSocket, signal: BlockSignal) -> Result<(), axum::Error> {
    socket.send(Message::Text(signal_text(signal).into())).await
}

fn signal_text(signal: BlockSignal) -> String {
    serde_json::json!({ "block": signal.block }).to_string()
}
