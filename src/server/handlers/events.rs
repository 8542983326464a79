//! WebSocket live channel.
//!
//! Streams download events to every connected observer. There is no replay:
//! a client connecting mid-transfer missed earlier events and reconciles
//! with GET /downloads first.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::super::AppState;
use crate::services::download::DownloadEvent;

/// GET /downloads/events: upgrade to a WebSocket event stream.
pub async fn download_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let rx = state.downloads.events().subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

async fn stream_events(socket: WebSocket, mut rx: broadcast::Receiver<DownloadEvent>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Slow observers skip; delivery is best-effort.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
