//! `/chat` channel event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Both sides tag events with a
//! snake_case `type` field.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{ActorRole, EndpointId, Message, MessageRole, SessionId};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
///
/// Session ids arrive as raw strings so that an empty or malformed id is
/// reported as a validation failure by the coordinator rather than as an
/// unparseable frame. Numeric ids still fail to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a session's room
    SubscribeToSession { session_id: String, role: ActorRole },

    /// Leave a session's room
    UnsubscribeFromSession { session_id: String },

    /// Chat submission from the user widget
    SendMessage {
        #[serde(alias = "query")]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Ask for a human operator; the session is inferred from the caller
    RequestHuman,

    /// Operator reply
    AdminReply { session_id: String, message: String },

    /// The user explicitly ends the conversation
    Leave,

    /// Operator ends the conversation
    CloseSession { session_id: String },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// New message persisted in a session
    MsgAdded {
        session_id: SessionId,
        message_id: Uuid,
        role: MessageRole,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_identity: Option<String>,
        sender_display_name: String,
        #[serde(with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
    },

    /// A session wants a human operator (admin audience)
    NeedHuman {
        session_id: SessionId,
        user_identity: String,
        message_count: u64,
    },

    /// The user left; the session is closed
    UserLeft {
        session_id: SessionId,
        user_identity: String,
        message: String,
    },

    /// An operator closed the session
    SessionClosed {
        session_id: SessionId,
        closed_by: String,
        message: String,
    },

    /// Connection acknowledged
    Connected { endpoint_id: EndpointId },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn msg_added(message: &Message) -> Self {
        ServerEvent::MsgAdded {
            session_id: message.session_id.clone(),
            message_id: message.id,
            role: message.role,
            message: message.body.clone(),
            sender_identity: message.sender_identity.clone(),
            sender_display_name: message.display_name().to_string(),
            created_at: message.created_at,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Wire name of the event, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::MsgAdded { .. } => "msg_added",
            ServerEvent::NeedHuman { .. } => "need_human",
            ServerEvent::UserLeft { .. } => "user_left",
            ServerEvent::SessionClosed { .. } => "session_closed",
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// The session this event concerns, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            ServerEvent::MsgAdded { session_id, .. }
            | ServerEvent::NeedHuman { session_id, .. }
            | ServerEvent::UserLeft { session_id, .. }
            | ServerEvent::SessionClosed { session_id, .. } => Some(session_id),
            ServerEvent::Connected { .. } | ServerEvent::Pong | ServerEvent::Error { .. } => None,
        }
    }
}
