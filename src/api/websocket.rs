//! WebSocket feed of live round events
//!
//! `GET /ws` streams every [`HallEvent`]; `GET /ws?table_id=...` narrows the
//! stream to one table. A heartbeat goes out every 30 seconds so idle
//! proxies keep the socket open.

use super::handlers::AppState;
use super::models::WsQuery;
use crate::bingo::types::TableId;
use crate::events::HallEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Frames sent besides hall events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    Connected { table_id: Option<TableId> },
    Heartbeat { timestamp: i64 },
    /// The client fell behind and `skipped` events were dropped
    Lagged { skipped: u64 },
}

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Response {
    let events = state.hall.subscribe();
    ws.on_upgrade(move |socket| handle_connection(socket, events, query.table_id))
}

fn wants(event: &HallEvent, filter: Option<TableId>) -> bool {
    filter.map_or(true, |table_id| event.table_id == table_id)
}

fn to_text<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            error!("Failed to serialize websocket frame: {}", e);
            None
        }
    }
}

async fn handle_connection(socket: WebSocket, mut events: broadcast::Receiver<HallEvent>, filter: Option<TableId>) {
    static CLIENTS: AtomicU64 = AtomicU64::new(0);
    let client_id = uuid::Uuid::new_v4();
    let connected = CLIENTS.fetch_add(1, Ordering::SeqCst) + 1;
    info!("WebSocket client {} connected (total: {})", client_id, connected);

    let (mut sender, mut receiver) = socket.split();

    let send_task = async {
        if let Some(hello) = to_text(&ControlFrame::Connected { table_id: filter }) {
            if sender.send(hello).await.is_err() {
                return;
            }
        }

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        loop {
            let frame = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) if wants(&event, filter) => to_text(&event),
                    Ok(_) => None,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client {} lagged, {} events dropped", client_id, skipped);
                        to_text(&ControlFrame::Lagged { skipped })
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = heartbeat.tick() => to_text(&ControlFrame::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                }),
            };

            if let Some(frame) = frame {
                if sender.send(frame).await.is_err() {
                    debug!("Client {} disconnected", client_id);
                    break;
                }
            }
        }
    };

    let receive_task = async {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => debug!("Ignoring message from client {}: {}", client_id, text),
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error from client {}: {}", client_id, e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = send_task => {}
        _ = receive_task => {}
    }

    let remaining = CLIENTS.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    info!("WebSocket client {} disconnected (remaining: {})", client_id, remaining);
}
