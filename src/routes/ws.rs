//! WebSocket endpoint
//!
//! Browsers can't set headers on an upgrade request, so the JWT arrives as
//! the `token` query parameter. Each socket is split into a sender task fed
//! by the hub and a receiver task handling client events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{authenticate, AuthContext};
use crate::routes::chats::{chat_partners, load_chat_for};
use crate::services::realtime::{ClientEvent, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: String,
}

/// GET /api/ws?token=<jwt>
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Response {
    let auth = match authenticate(&state, &query.token) {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth))
}

async fn broadcast_presence(state: &AppState, user_id: Uuid, online: bool) {
    match chat_partners(&state.db, user_id).await {
        Ok(partners) => {
            let event = ServerEvent::Presence { user_id, online };
            state.hub.send_to_users(&partners, &event);
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to load chat partners for presence");
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, auth: AuthContext) {
    let user_id = auth.user_id;
    let registration = state.hub.register(user_id);
    let connection_id = registration.connection_id;
    let mut hub_rx = registration.receiver;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket connected");

    // Replies meant for this connection only (pong, errors)
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let _ = reply_tx.send(ServerEvent::Connected {
        user_id,
        connection_id,
    });

    if registration.came_online {
        broadcast_presence(&state, user_id, true).await;
    }

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = hub_rx.recv() => event,
                event = reply_rx.recv() => event,
            };
            // The hub drops our sender on shutdown
            let Some(event) = event else { break };
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize realtime event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                tracing::debug!(connection_id = %connection_id, "WebSocket sink closed");
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_client_event(&recv_state, user_id, &text, &reply_tx).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let went_offline = state.hub.unregister(user_id, connection_id);
    if went_offline {
        broadcast_presence(&state, user_id, false).await;
    }
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket disconnected");
}

async fn handle_client_event(
    state: &AppState,
    user_id: Uuid,
    text: &str,
    reply: &mpsc::UnboundedSender<ServerEvent>,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            let _ = reply.send(ServerEvent::Error {
                message: "Unrecognised event".to_string(),
            });
            return;
        }
    };

    match event {
        ClientEvent::Ping => {
            let _ = reply.send(ServerEvent::Pong);
        }
        ClientEvent::Typing { chat_id } => match load_chat_for(&state.db, chat_id, user_id).await {
            Ok(chat) => {
                let typing = ServerEvent::Typing { chat_id, user_id };
                state.hub.send_to_user(chat.counterpart(user_id), &typing);
            }
            Err(_) => {
                let _ = reply.send(ServerEvent::Error {
                    message: "Chat not found".to_string(),
                });
            }
        },
    }
}
