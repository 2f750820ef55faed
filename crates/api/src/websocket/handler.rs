//! WebSocket handler for Axum
//!
//! Handles `/chat` connections: authentication, the per-endpoint writer task
//! and routing of client events into the chat coordinator.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use helpline_shared::{Actor, ClientEvent, ServerEvent, SessionId};

use crate::chat::IngestRequest;
use crate::state::AppState;

use super::connection::Connection;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
/// Authenticates via query parameter token since browsers cannot set headers
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let actor = match app_state.jwt.authenticate(&params.token) {
        Ok(actor) => actor,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed: invalid token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    tracing::info!(
        identity = %actor.identity,
        role = %actor.role,
        "WebSocket connection upgrade requested"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, actor, app_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, actor: Actor, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded so one stalled browser cannot grow memory without limit
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(app_state.config.endpoint_queue_capacity);

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(actor, tx)).await;
    let endpoint_id = conn.endpoint_id;
    app_state.chat.attach(&conn).await;

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(endpoint_id = %endpoint_id, error = %e, "WebSocket receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &app_state).await,
                Err(e) => {
                    tracing::warn!(
                        endpoint_id = %endpoint_id,
                        error = %e,
                        "Failed to parse client event"
                    );
                    report(&conn, "invalid_event", "Invalid event format");
                }
            },
            Message::Close(_) => {
                tracing::info!(endpoint_id = %endpoint_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {
                report(&conn, "invalid_event", "Binary frames are not supported");
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(
        endpoint_id = %endpoint_id,
        identity = %conn.actor.identity,
        "WebSocket connection closing"
    );
    ws_state.remove_connection(&endpoint_id).await;
    app_state.chat.disconnect(&conn).await;

    send_task.abort();
}

/// Handle client event
async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, app_state: &AppState) {
    use ClientEvent::*;

    let chat = &app_state.chat;
    match event {
        SubscribeToSession { session_id, role } => {
            if let Err(e) = chat.subscribe(conn, &session_id, role).await {
                tracing::debug!(
                    endpoint_id = %conn.endpoint_id,
                    session_id = %session_id,
                    error = %e,
                    "Subscribe rejected"
                );
                report(conn, e.code(), e.to_string());
            }
        }

        UnsubscribeFromSession { session_id } => {
            if let Err(e) = chat.unsubscribe(conn, &session_id).await {
                report(conn, e.code(), e.to_string());
            }
        }

        SendMessage {
            message,
            session_id,
        } => {
            let session_id = match session_id.as_deref().map(SessionId::parse).transpose() {
                Ok(id) => id,
                Err(e) => return report(conn, "validation_error", e.to_string()),
            };
            let request = IngestRequest::from_actor(conn.actor.clone(), session_id, message);
            if let Err(e) = chat.ingest(Some(conn), request).await {
                report(conn, e.code(), e.to_string());
            }
        }

        RequestHuman => {
            if let Err(e) = chat.request_human(Some(conn), &conn.actor).await {
                report(conn, e.code(), e.to_string());
            }
        }

        AdminReply {
            session_id,
            message,
        } => {
            if !conn.actor.is_admin() {
                return report(conn, "forbidden", "Only admins can reply");
            }
            let session_id = match SessionId::parse(&session_id) {
                Ok(id) => id,
                Err(e) => return report(conn, "validation_error", e.to_string()),
            };
            let request = IngestRequest::from_actor(conn.actor.clone(), Some(session_id), message);
            if let Err(e) = chat.ingest(Some(conn), request).await {
                report(conn, e.code(), e.to_string());
            }
        }

        Leave => {
            if let Err(e) = chat.leave(&conn.actor).await {
                report(conn, e.code(), e.to_string());
            }
        }

        CloseSession { session_id } => {
            let session_id = match SessionId::parse(&session_id) {
                Ok(id) => id,
                Err(e) => return report(conn, "validation_error", e.to_string()),
            };
            if let Err(e) = chat.close_session(&conn.actor, &session_id).await {
                report(conn, e.code(), e.to_string());
            }
        }

        Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}

/// Report a failed request back to the endpoint that made it
fn report(conn: &Connection, code: &str, message: impl Into<String>) {
    let _ = conn.send(ServerEvent::error(code, message));
}
