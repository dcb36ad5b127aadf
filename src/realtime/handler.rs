//! Realtime Handler
//!
//! Upgrades `/ws` for a signed-in user and runs the connection lifecycle.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::hub::ConnectionHub;
use super::messages::{ClientMessage, ServerMessage};
use crate::api::AppState;
use crate::auth::{CurrentUser, SessionToken};

/// WebSocket upgrade handler
///
/// Anonymous requests are rejected with 401 before the upgrade. The socket
/// is closed when its session signs out.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    SessionToken(token): SessionToken,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, user.id, token))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    user_id: Uuid,
    session: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.register_with_session(user_id, session, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register realtime connection");
            if let Some(msg) = encode(&ServerMessage::Error {
                message: e.to_string(),
            }) {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let connected = encode(&ServerMessage::Connected {
        connection_id: connection_id.clone(),
    });
    let sent = match connected {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };
    if !sent {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        hub.unregister(&connection_id).await;
        return;
    }

    let conn_id_for_send = connection_id.clone();

    // Forward hub messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
        // Queue closed: the hub dropped this connection
        let _ = sender.close().await;
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &conn_id_for_recv, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
}

/// Handle a received frame. Returns false if the connection should close.
async fn handle_ws_message(hub: &ConnectionHub, connection_id: &str, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(hub, connection_id, client_msg).await;
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "Invalid client message"
                    );
                    let error_msg = ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    };
                    let _ = hub.send_to(connection_id, error_msg).await;
                }
            }
            true
        }
        Message::Binary(_) => {
            let error_msg = ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            };
            let _ = hub.send_to(connection_id, error_msg).await;
            true
        }
        // axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

async fn handle_client_message(hub: &ConnectionHub, connection_id: &str, message: ClientMessage) {
    let response = match message {
        ClientMessage::Subscribe {
            channel,
            table,
            event,
            filter,
        } => match hub
            .subscribe(connection_id, &channel, &table, event, filter.as_deref())
            .await
        {
            Ok(topic) => ServerMessage::Subscribed { channel, topic },
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Subscribe refused");
                ServerMessage::Error {
                    message: e.to_string(),
                }
            }
        },
        ClientMessage::Unsubscribe { channel } => {
            match hub.unsubscribe(connection_id, &channel).await {
                Ok(_) => ServerMessage::Unsubscribed { channel },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    };

    let _ = hub.send_to(connection_id, response).await;
}
