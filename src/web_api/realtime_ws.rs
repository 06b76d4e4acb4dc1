//! Realtime WebSocket bridge
//!
//! Remote display devices and panels subscribe to the change feed with the
//! same table / event / filter shape used in-process. Only notifications
//! cross the socket; clients re-read queues over HTTP.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::realtime_hub::{ChangeNotification, Subscription};
use crate::state::AppState;

/// Client -> server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the connection's subscriptions
    Subscribe {
        #[serde(default)]
        label: Option<String>,
        subscriptions: Vec<Subscription>,
    },
    Unsubscribe,
    Ping,
}

/// Server -> client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { subscription_id: Uuid },
    Unsubscribed,
    Change(ChangeNotification),
    Pong,
    Error { message: String },
}

type ActiveSubscription = (Uuid, mpsc::UnboundedReceiver<ChangeNotification>);

/// WebSocket handler
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_realtime_socket(socket, state))
}

async fn next_change(active: &mut Option<ActiveSubscription>) -> Option<ChangeNotification> {
    match active {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize realtime message");
            true
        }
    }
}

/// Drive one WebSocket connection
async fn handle_realtime_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();
    let mut active: Option<ActiveSubscription> = None;

    tracing::info!(connection_id = %connection_id, "Realtime WebSocket client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let reply = match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { label, subscriptions }) => {
                                if let Some((id, _)) = active.take() {
                                    state.realtime.unsubscribe(&id).await;
                                }
                                let label = label.unwrap_or_else(|| format!("ws:{}", connection_id));
                                let (id, rx) = state.realtime.subscribe(label, subscriptions).await;
                                active = Some((id, rx));
                                ServerMessage::Subscribed { subscription_id: id }
                            }
                            Ok(ClientMessage::Unsubscribe) => {
                                if let Some((id, _)) = active.take() {
                                    state.realtime.unsubscribe(&id).await;
                                }
                                ServerMessage::Unsubscribed
                            }
                            Ok(ClientMessage::Ping) => ServerMessage::Pong,
                            Err(e) => {
                                tracing::debug!(connection_id = %connection_id, error = %e, "Invalid realtime message");
                                ServerMessage::Error { message: e.to_string() }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(connection_id = %connection_id, "Realtime WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %connection_id, error = %e, "Realtime WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                };
                if !send_message(&mut sender, &reply).await {
                    break;
                }
            }
            change = next_change(&mut active) => {
                match change {
                    Some(notification) => {
                        if !send_message(&mut sender, &ServerMessage::Change(notification)).await {
                            break;
                        }
                    }
                    None => {
                        // Hub dropped the subscriber (shutdown)
                        active = None;
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    if let Some((id, _)) = active {
        state.realtime.unsubscribe(&id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime_hub::{ChangeEvent, ChangeTable, ScreenFilter};
    use serde_json::json;

    #[test]
    fn test_parse_subscribe_message() {
        let raw = json!({
            "type": "subscribe",
            "subscriptions": [
                {
                    "table": "queue_entries",
                    "event": "insert",
                    "filter": { "kind": "screen", "screen_id": "s1" }
                }
            ]
        });
        let message: ClientMessage = serde_json::from_value(raw).unwrap();
        match message {
            ClientMessage::Subscribe { label, subscriptions } => {
                assert!(label.is_none());
                assert_eq!(
                    subscriptions,
                    vec![Subscription::new(
                        ChangeTable::QueueEntries,
                        ChangeEvent::Insert,
                        ScreenFilter::Screen("s1".into())
                    )]
                );
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_change_message_shape() {
        let notification =
            ChangeNotification::new(ChangeTable::Screens, ChangeEvent::Update, "s1", Some("s1"));
        let value = serde_json::to_value(ServerMessage::Change(notification)).unwrap();
        assert_eq!(value["type"], "change");
        assert_eq!(value["table"], "screens");
        assert_eq!(value["event"], "update");
        assert_eq!(value["record_id"], "s1");
    }
}
