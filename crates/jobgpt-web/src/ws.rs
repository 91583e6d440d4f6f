//! WebSocket upgrade handler and message dispatch.
//!
//! Each connected client receives:
//! 1. A [`WsMessage::Snapshot`] of its panel state on connect, followed by
//!    any `research-company-done` it has not acknowledged yet.
//! 2. [`WsMessage::Notification`]s addressed to its client id.
//! 3. A [`WsMessage::Response`] for every command it sends.
//!
//! A completion racing the connect can arrive twice; the second ack is
//! answered with `ERROR_REQUEST_NOT_FOUND`.
//!
//! All outbound traffic goes through one per-connection queue so replies
//! and notifications never interleave mid-frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use jobgpt::background::{BackgroundController, Command, CommandResponse, Notification};
use jobgpt::config::DEFAULT_CLIENT_ID;
use jobgpt::panel::PanelState;
use jobgpt::registry::RequestSummary;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Server → client message.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum WsMessage {
    /// Full panel state plus live request ids.
    Snapshot {
        client_id: String,
        state: PanelState,
        requests: Vec<RequestSummary>,
    },
    /// Reply to a command sent over this socket.
    Response { response: CommandResponse },
    /// A background notification for this client.
    Notification { notification: Notification },
    /// The client sent something that is not a command.
    Error { message: String },
}

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub background: Arc<BackgroundController>,
    pub queue_capacity: usize,
}

#[derive(Deserialize)]
pub struct WsParams {
    client_id: Option<String>,
}

/// GET /ws: WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    let client_id = params
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state, client_id))
}

async fn handle_socket(socket: WebSocket, ws_state: WsState, client_id: String) {
    let WsState {
        background,
        queue_capacity,
    } = ws_state;
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the snapshot so nothing falls between the two.
    let mut notifications = background.subscribe();
    for msg in resync(&background, &client_id) {
        if ws_send(&mut sink, &msg).await.is_err() {
            return;
        }
    }
    debug!("WebSocket client {client_id} connected");

    let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(queue_capacity);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_send(&mut sink, &msg).await.is_err() {
                break;
            }
        }
    });

    let forward_task = {
        let out_tx = out_tx.clone();
        let background = background.clone();
        let client_id = client_id.clone();
        tokio::spawn(async move {
            'forward: loop {
                let batch = match notifications.recv().await {
                    Ok(notification) if notification.client_id() == client_id => {
                        vec![WsMessage::Notification { notification }]
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client {client_id} lagged by {n}, resending snapshot");
                        resync(&background, &client_id)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                for msg in batch {
                    if out_tx.send(msg).await.is_err() {
                        break 'forward;
                    }
                }
            }
        })
    };

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let reply = handle_client_message(&text, &background);
                if out_tx.send(reply).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!("WebSocket client {client_id} disconnected");
    forward_task.abort();
    writer.abort();
}

/// Dispatch one text frame from a client.
pub fn handle_client_message(text: &str, background: &BackgroundController) -> WsMessage {
    match serde_json::from_str::<Command>(text) {
        Ok(command) => WsMessage::Response {
            response: background.handle(command),
        },
        Err(e) => {
            debug!("Ignoring malformed WebSocket message: {e}");
            WsMessage::Error {
                message: format!("invalid command: {e}"),
            }
        }
    }
}

/// Snapshot plus the client's unacknowledged completions.
fn resync(background: &BackgroundController, client_id: &str) -> Vec<WsMessage> {
    let mut batch = vec![snapshot(background, client_id)];
    batch.extend(
        background
            .undelivered(client_id)
            .into_iter()
            .map(|notification| WsMessage::Notification { notification }),
    );
    batch
}

fn snapshot(background: &BackgroundController, client_id: &str) -> WsMessage {
    let state = background
        .store()
        .load_state(client_id)
        .unwrap_or_else(|e| {
            warn!("Failed to load state for {client_id}: {e}");
            None
        })
        .unwrap_or_default();
    WsMessage::Snapshot {
        client_id: client_id.to_string(),
        state,
        requests: background.requests_for(client_id),
    }
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
