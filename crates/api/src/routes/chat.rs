//! Support chat HTTP routes
//!
//! HTTP twins of the `/chat` socket events for clients that post over plain
//! requests. Fan-out still reaches every subscribed socket.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use helpline_shared::{Actor, Message, Session, SessionId, SessionState};

use crate::chat::IngestRequest;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(alias = "query")]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
pub struct AdminReplyRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub session_id: SessionId,
    pub state: SessionState,
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<Message>,
    pub ai_degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct RequestHumanResponse {
    pub session_id: SessionId,
    pub state: SessionState,
    pub admins_notified: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub user_identity: String,
    pub state: SessionState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Session> for SessionSummary {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.id,
            user_identity: s.user_identity,
            state: s.state,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
}

fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|e| ApiError::Validation(e.to_string()))
}

// =============================================================================
// User routes
// =============================================================================

/// GET /chat/sessions/:session_id/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<MessagesResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let messages = state.chat.history(&actor, &session_id).await?;
    Ok(Json(MessagesResponse {
        session_id,
        messages,
    }))
}

/// POST /chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<SendMessageResponse>)> {
    if actor.is_admin() && body.session_id.is_none() {
        return Err(ApiError::BadRequest("session_id is required".into()));
    }
    let request = IngestRequest::from_actor(actor, body.session_id, body.message);
    let outcome = state.chat.ingest(None, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            session_id: outcome.session.id,
            state: outcome.session.state,
            message: outcome.stored_message,
            reply: outcome.ai_message,
            ai_degraded: outcome.ai_degraded,
        }),
    ))
}

/// POST /chat/request-human
pub async fn request_human(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<RequestHumanResponse>> {
    let outcome = state.chat.request_human(None, &actor).await?;
    Ok(Json(RequestHumanResponse {
        session_id: outcome.session.id,
        state: outcome.session.state,
        admins_notified: outcome.transition.notify_admins,
    }))
}

// =============================================================================
// Admin routes
// =============================================================================

fn require_admin(actor: &Actor) -> ApiResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// GET /admin/chat/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    require_admin(&actor)?;
    let sessions = state.chat.open_sessions(&actor).await?;
    Ok(Json(sessions.into_iter().map(SessionSummary::from).collect()))
}

/// POST /admin/chat/sessions/:session_id/reply
pub async fn admin_reply(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<String>,
    Json(body): Json<AdminReplyRequest>,
) -> ApiResult<(StatusCode, Json<SendMessageResponse>)> {
    require_admin(&actor)?;
    let session_id = parse_session_id(&session_id)?;
    let request = IngestRequest::from_actor(actor, Some(session_id), body.message);
    let outcome = state.chat.ingest(None, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            session_id: outcome.session.id,
            state: outcome.session.state,
            message: outcome.stored_message,
            reply: None,
            ai_degraded: false,
        }),
    ))
}

/// POST /admin/chat/sessions/:session_id/close
pub async fn close_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    require_admin(&actor)?;
    let session_id = parse_session_id(&session_id)?;
    let outcome = state.chat.close_session(&actor, &session_id).await?;
    Ok(Json(outcome.session.into()))
}
