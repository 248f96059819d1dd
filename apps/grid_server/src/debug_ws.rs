use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use gridstate::{AttackCommand, BuffCommand, MoveCommand, ServiceError, TradeCommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{AppState, SharedState};

const SCOPE_ACK: &str = "ack";
const SCOPE_BROADCAST: &str = "broadcast";

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Connected debug clients; broadcast frames go to every one of them.
pub type Clients = Arc<tokio::sync::Mutex<HashMap<u64, mpsc::Sender<String>>>>;

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
struct OutboundFrame {
    #[serde(rename = "type")]
    kind: String,
    scope: &'static str,
    #[serde(rename = "roomId", skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl OutboundFrame {
    fn ack_error(kind: &str, error: String) -> Self {
        Self {
            kind: kind.to_string(),
            scope: SCOPE_ACK,
            room_id: None,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON command surface for poking the interaction store by hand:
/// `{"type": "move", "payload": {...}}` and friends.
pub async fn accept(State(state): State<SharedState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_debug_socket(state, socket))
}

async fn handle_debug_socket(state: SharedState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    state.debug_clients.lock().await.insert(client_id, tx.clone());
    info!(client = client_id, "debug ws client connected");

    let writer = tokio::spawn(async move {
        while let Some(s) = rx.recv().await {
            if sink.send(WsMessage::Text(s)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        match msg {
            WsMessage::Text(text) => {
                let (ack, broadcast) = handle_frame(&state, &text).await;
                if let Ok(s) = serde_json::to_string(&ack) {
                    let _ = tx.send(s).await;
                }
                if let Some(frame) = broadcast {
                    if let Ok(s) = serde_json::to_string(&frame) {
                        broadcast_to_clients(&state.debug_clients, &s).await;
                    }
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.debug_clients.lock().await.remove(&client_id);
    drop(tx);
    let _ = writer.await;
    info!(client = client_id, "debug ws client disconnected");
}

async fn broadcast_to_clients(clients: &Clients, payload: &str) {
    let clients = clients.lock().await;
    for (client_id, tx) in clients.iter() {
        if tx.try_send(payload.to_string()).is_err() {
            warn!(client = client_id, "dropping debug broadcast (buffer full)");
        }
    }
}

fn respond<T: Serialize>(
    kind: &str,
    room_id: String,
    result: Result<T, ServiceError>,
    broadcast: bool,
) -> (OutboundFrame, Option<OutboundFrame>) {
    let value = match result {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(value) => value,
            Err(err) => return (OutboundFrame::ack_error(kind, err.to_string()), None),
        },
        Err(err) => return (OutboundFrame::ack_error(kind, err.to_string()), None),
    };

    let ack = OutboundFrame {
        kind: kind.to_string(),
        scope: SCOPE_ACK,
        room_id: None,
        result: Some(value.clone()),
        error: None,
    };
    let broadcast = broadcast.then(|| OutboundFrame {
        kind: kind.to_string(),
        scope: SCOPE_BROADCAST,
        room_id: Some(room_id),
        result: Some(value),
        error: None,
    });
    (ack, broadcast)
}

async fn handle_frame(state: &AppState, text: &str) -> (OutboundFrame, Option<OutboundFrame>) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            return (
                OutboundFrame::ack_error("", format!("invalid frame: {err}")),
                None,
            );
        }
    };
    let kind = frame.kind.to_ascii_lowercase();

    match kind.as_str() {
        "move" => match serde_json::from_value::<MoveCommand>(frame.payload) {
            Ok(cmd) => {
                let room_id = cmd.room_id.clone();
                respond(&kind, room_id, state.interactions.apply_move(cmd).await, true)
            }
            Err(err) => (
                OutboundFrame::ack_error(&kind, format!("invalid payload: {err}")),
                None,
            ),
        },
        "buff" => match serde_json::from_value::<BuffCommand>(frame.payload) {
            Ok(cmd) => {
                let room_id = cmd.room_id.clone();
                respond(&kind, room_id, state.interactions.apply_buff(cmd).await, true)
            }
            Err(err) => (
                OutboundFrame::ack_error(&kind, format!("invalid payload: {err}")),
                None,
            ),
        },
        "attack" => match serde_json::from_value::<AttackCommand>(frame.payload) {
            Ok(cmd) => {
                let room_id = cmd.room_id.clone();
                respond(&kind, room_id, state.interactions.apply_attack(cmd).await, true)
            }
            Err(err) => (
                OutboundFrame::ack_error(&kind, format!("invalid payload: {err}")),
                None,
            ),
        },
        // Trades are acknowledged to the initiator only.
        "trade" => match serde_json::from_value::<TradeCommand>(frame.payload) {
            Ok(cmd) => {
                let room_id = cmd.room_id.clone();
                respond(&kind, room_id, state.interactions.apply_trade(cmd).await, false)
            }
            Err(err) => (
                OutboundFrame::ack_error(&kind, format!("invalid payload: {err}")),
                None,
            ),
        },
        other => (
            OutboundFrame::ack_error(other, format!("unsupported type: {other}")),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_frame_shape() {
        let frame = OutboundFrame {
            kind: "move".to_string(),
            scope: SCOPE_BROADCAST,
            room_id: Some("room-1".to_string()),
            result: Some(serde_json::json!({"ok": true})),
            error: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "move");
        assert_eq!(json["scope"], "broadcast");
        assert_eq!(json["roomId"], "room-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn ack_error_drops_optional_fields() {
        let frame = OutboundFrame::ack_error("attack", "nope".to_string());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["scope"], "ack");
        assert_eq!(json["error"], "nope");
        assert!(json.get("result").is_none());
        assert!(json.get("roomId").is_none());
    }
}
