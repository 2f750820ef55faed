//! Message ingestion pipeline
//!
//! Resolves the target session, runs the escalation state machine, persists
//! the results and returns the events to fan out. Nothing here touches the
//! transport, so every decision can be tested against a store alone.
//!
//! Persistence always completes before an event is produced: a storage error
//! returns early and the caller has nothing to broadcast.

use std::sync::Arc;
use std::time::Duration;

use helpline_shared::{
    validate_body, Actor, ActorRole, Message, MessageRole, ServerEvent, Session, SessionId,
    ValidationError,
};
use time::OffsetDateTime;

use super::escalation::{EscalationError, EscalationEvent, EscalationStateMachine, Transition};
use crate::ai::{AiQuery, AiResponder};
use crate::store::{SessionStore, StoreError};
use crate::websocket::room::Audience;

pub const HUMAN_REQUESTED_NOTICE: &str = "The user asked to talk to a human operator.";
pub const USER_LEFT_NOTICE: &str = "The user has left the chat. This conversation is closed.";
pub const ADMIN_CLOSED_NOTICE: &str = "Support closed this conversation.";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A session id is required")]
    MissingSessionId,

    #[error("Session not found: {0}")]
    UnknownSession(SessionId),

    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    #[error("Session {0} belongs to another user")]
    Unauthorized(SessionId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Messages with role {0} cannot be submitted")]
    UnsupportedRole(MessageRole),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl IngestError {
    /// Storage failures may succeed on retry; everything else is the caller's fault
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Storage(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation_error",
            IngestError::MissingSessionId => "missing_session_id",
            IngestError::UnknownSession(_) => "unknown_session",
            IngestError::SessionClosed(_) => "session_closed",
            IngestError::Unauthorized(_) => "unauthorized",
            IngestError::Forbidden(_) => "forbidden",
            IngestError::UnsupportedRole(_) => "unsupported_role",
            IngestError::Storage(_) => "storage_unavailable",
        }
    }
}

impl From<EscalationError> for IngestError {
    fn from(err: EscalationError) -> Self {
        match err {
            EscalationError::SessionClosed(id) => IngestError::SessionClosed(id),
        }
    }
}

/// An event and who should receive it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Outbound {
    fn to_session(session_id: &SessionId, event: ServerEvent) -> Self {
        Self {
            audience: Audience::Session(session_id.clone()),
            event,
        }
    }
}

/// One inbound chat message
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Target session; `None` lets a user continue or start a conversation
    pub session_id: Option<SessionId>,
    pub role: MessageRole,
    pub body: String,
    pub sender: Actor,
}

impl IngestRequest {
    pub fn from_actor(sender: Actor, session_id: Option<SessionId>, body: impl Into<String>) -> Self {
        Self {
            session_id,
            role: sender.role.message_role(),
            body: body.into(),
            sender,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Session after the message was applied
    pub session: Session,
    pub stored_message: Message,
    pub ai_message: Option<Message>,
    /// The AI should have answered but did not
    pub ai_degraded: bool,
    pub events: Vec<Outbound>,
}

#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub session: Session,
    pub transition: Transition,
    pub events: Vec<Outbound>,
}

#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub session: Session,
    pub events: Vec<Outbound>,
}

pub struct IngestionPipeline {
    store: Arc<dyn SessionStore>,
    ai: Arc<dyn AiResponder>,
    machine: EscalationStateMachine,
    ai_timeout: Duration,
    max_body_bytes: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn SessionStore>,
        ai: Arc<dyn AiResponder>,
        machine: EscalationStateMachine,
        ai_timeout: Duration,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            store,
            ai,
            machine,
            ai_timeout,
            max_body_bytes,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Accept a message from a user or an operator
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        if request.role != request.sender.role.message_role() {
            return match request.role {
                MessageRole::Ai | MessageRole::System => {
                    Err(IngestError::UnsupportedRole(request.role))
                }
                role => Err(IngestError::Forbidden(format!(
                    "{} cannot post as {}",
                    request.sender.role, role
                ))),
            };
        }
        let body = validate_body(&request.body, self.max_body_bytes)?;

        match request.sender.role {
            ActorRole::User => self.ingest_user(request.session_id, body, request.sender).await,
            ActorRole::Admin => self.ingest_admin(request.session_id, body, request.sender).await,
        }
    }

    async fn ingest_user(
        &self,
        session_id: Option<SessionId>,
        body: String,
        sender: Actor,
    ) -> Result<IngestOutcome, IngestError> {
        let mut session = self.resolve_user_session(session_id, &sender.identity).await?;
        let transition =
            self.machine
                .apply(&mut session, EscalationEvent::UserMessage, OffsetDateTime::now_utc())?;

        let stored_message = Message::new(
            session.id.clone(),
            MessageRole::User,
            body,
            Some(sender.identity.clone()),
            sender.display_name.clone(),
        );
        self.store.record(&session, &stored_message).await?;

        let mut events = vec![Outbound::to_session(
            &session.id,
            ServerEvent::msg_added(&stored_message),
        )];

        let mut ai_message = None;
        let mut ai_degraded = false;
        if transition.ai_reply {
            match self.generate_reply(&session, &stored_message.body).await {
                Some(reply) => {
                    events.push(Outbound::to_session(&session.id, ServerEvent::msg_added(&reply)));
                    ai_message = Some(reply);
                }
                None => ai_degraded = true,
            }
        }

        tracing::debug!(
            session_id = %session.id,
            message_id = %stored_message.id,
            state = %session.state,
            ai_degraded,
            "User message ingested"
        );

        Ok(IngestOutcome {
            session,
            stored_message,
            ai_message,
            ai_degraded,
            events,
        })
    }

    async fn ingest_admin(
        &self,
        session_id: Option<SessionId>,
        body: String,
        sender: Actor,
    ) -> Result<IngestOutcome, IngestError> {
        let session_id = session_id.ok_or(IngestError::MissingSessionId)?;
        let mut session = self.load_open(&session_id).await?;
        self.machine
            .apply(&mut session, EscalationEvent::AdminReply, OffsetDateTime::now_utc())?;

        let stored_message = Message::new(
            session.id.clone(),
            MessageRole::Admin,
            body,
            Some(sender.identity.clone()),
            sender.display_name.clone(),
        );
        // The state flip and the reply land together or not at all
        self.store.record(&session, &stored_message).await?;

        tracing::info!(
            session_id = %session.id,
            admin = %sender.identity,
            "Admin reply ingested"
        );

        let events = vec![Outbound::to_session(
            &session.id,
            ServerEvent::msg_added(&stored_message),
        )];
        Ok(IngestOutcome {
            session,
            stored_message,
            ai_message: None,
            ai_degraded: false,
            events,
        })
    }

    /// The caller wants a human; the session is inferred from their identity
    pub async fn request_human(&self, actor: &Actor) -> Result<EscalationOutcome, IngestError> {
        if actor.is_admin() {
            return Err(IngestError::Forbidden(
                "only users can request a human operator".into(),
            ));
        }

        let mut session = match self.store.find_open_session(&actor.identity).await? {
            Some(session) => session,
            None => self.open_session(&actor.identity).await?,
        };
        let transition = self.machine.apply(
            &mut session,
            EscalationEvent::HumanRequested,
            OffsetDateTime::now_utc(),
        )?;
        let mut events = Vec::new();
        if transition.changed() {
            let marker = Message::system(session.id.clone(), HUMAN_REQUESTED_NOTICE);
            self.store.record(&session, &marker).await?;
            events.push(Outbound::to_session(&session.id, ServerEvent::msg_added(&marker)));
        } else {
            self.store.update_session(&session).await?;
        }

        if transition.notify_admins {
            let message_count = self.store.message_count(&session.id).await?;
            events.push(Outbound {
                audience: Audience::Admins,
                event: ServerEvent::NeedHuman {
                    session_id: session.id.clone(),
                    user_identity: session.user_identity.clone(),
                    message_count,
                },
            });
            tracing::info!(
                session_id = %session.id,
                user_identity = %session.user_identity,
                message_count,
                "Human operator requested"
            );
        } else {
            tracing::debug!(
                session_id = %session.id,
                state = %session.state,
                "Repeated human request suppressed"
            );
        }

        Ok(EscalationOutcome {
            session,
            transition,
            events,
        })
    }

    /// Close a user's session because they left or stayed disconnected
    ///
    /// Returns `None` when there is no open session to close.
    pub async fn close_for_user(
        &self,
        identity: &str,
        session_id: Option<&SessionId>,
    ) -> Result<Option<CloseOutcome>, IngestError> {
        let session = match session_id {
            Some(id) => self
                .store
                .get_session(id)
                .await?
                .filter(|s| s.is_owned_by(identity)),
            None => self.store.find_open_session(identity).await?,
        };
        let Some(mut session) = session.filter(|s| !s.state.is_closed()) else {
            return Ok(None);
        };

        self.machine
            .apply(&mut session, EscalationEvent::UserLeft, OffsetDateTime::now_utc())?;
        self.store
            .record(&session, &Message::system(session.id.clone(), USER_LEFT_NOTICE))
            .await?;

        let events = vec![Outbound {
            audience: Audience::SessionAndAdmins(session.id.clone()),
            event: ServerEvent::UserLeft {
                session_id: session.id.clone(),
                user_identity: session.user_identity.clone(),
                message: USER_LEFT_NOTICE.to_string(),
            },
        }];
        Ok(Some(CloseOutcome { session, events }))
    }

    /// An operator ends the conversation
    pub async fn close_by_admin(
        &self,
        actor: &Actor,
        session_id: &SessionId,
    ) -> Result<CloseOutcome, IngestError> {
        if !actor.is_admin() {
            return Err(IngestError::Forbidden("only admins can close sessions".into()));
        }
        let mut session = self.load_open(session_id).await?;
        self.machine
            .apply(&mut session, EscalationEvent::AdminClosed, OffsetDateTime::now_utc())?;
        self.store
            .record(&session, &Message::system(session.id.clone(), ADMIN_CLOSED_NOTICE))
            .await?;

        tracing::info!(session_id = %session.id, admin = %actor.identity, "Session closed by admin");

        let events = vec![Outbound {
            audience: Audience::SessionAndAdmins(session.id.clone()),
            event: ServerEvent::SessionClosed {
                session_id: session.id.clone(),
                closed_by: actor.identity.clone(),
                message: ADMIN_CLOSED_NOTICE.to_string(),
            },
        }];
        Ok(CloseOutcome { session, events })
    }

    /// Ordered message log of a session the actor may see
    pub async fn history(
        &self,
        actor: &Actor,
        session_id: &SessionId,
    ) -> Result<Vec<Message>, IngestError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| IngestError::UnknownSession(session_id.clone()))?;
        if !actor.is_admin() && !session.is_owned_by(&actor.identity) {
            return Err(IngestError::Unauthorized(session_id.clone()));
        }
        Ok(self.store.list_messages(session_id).await?)
    }

    /// Sessions not yet closed, for the operator console
    pub async fn list_open_sessions(&self, actor: &Actor) -> Result<Vec<Session>, IngestError> {
        if !actor.is_admin() {
            return Err(IngestError::Forbidden("only admins can list sessions".into()));
        }
        Ok(self.store.list_open_sessions().await?)
    }

    /// Identity owning a session, used to pick the serialization key
    pub async fn owner_of(&self, session_id: &SessionId) -> Result<String, IngestError> {
        self.store
            .get_session(session_id)
            .await?
            .map(|s| s.user_identity)
            .ok_or_else(|| IngestError::UnknownSession(session_id.clone()))
    }

    async fn resolve_user_session(
        &self,
        session_id: Option<SessionId>,
        identity: &str,
    ) -> Result<Session, IngestError> {
        if let Some(id) = session_id {
            let session = self
                .store
                .get_session(&id)
                .await?
                .ok_or_else(|| IngestError::UnknownSession(id.clone()))?;
            if !session.is_owned_by(identity) {
                return Err(IngestError::Unauthorized(id));
            }
            if !session.state.is_closed() {
                return Ok(session);
            }
            tracing::debug!(
                session_id = %id,
                "Message for closed session - starting a new one"
            );
        }

        match self.store.find_open_session(identity).await? {
            Some(session) => Ok(session),
            None => self.open_session(identity).await,
        }
    }

    async fn open_session(&self, identity: &str) -> Result<Session, IngestError> {
        let session = Session::open(identity);
        self.store.create_session(&session).await?;
        tracing::info!(
            session_id = %session.id,
            user_identity = %identity,
            "Support session opened"
        );
        Ok(session)
    }

    async fn load_open(&self, session_id: &SessionId) -> Result<Session, IngestError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| IngestError::UnknownSession(session_id.clone()))?;
        if session.state.is_closed() {
            return Err(IngestError::SessionClosed(session_id.clone()));
        }
        Ok(session)
    }

    /// Ask the AI and persist its answer. `None` means degraded.
    async fn generate_reply(&self, session: &Session, query: &str) -> Option<Message> {
        let call = self.ai.respond(AiQuery {
            session_id: &session.id,
            user_identity: &session.user_identity,
            query,
        });

        let text = match tokio::time::timeout(self.ai_timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::warn!(session_id = %session.id, error = %err, "AI reply unavailable");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session.id,
                    timeout_ms = self.ai_timeout.as_millis() as u64,
                    "AI reply timed out"
                );
                return None;
            }
        };

        let reply = Message::new(session.id.clone(), MessageRole::Ai, text, None, None);
        match self.store.append_message(&reply).await {
            Ok(()) => Some(reply),
            Err(err) => {
                tracing::error!(
                    session_id = %session.id,
                    error = %err,
                    "Failed to persist AI reply"
                );
                None
            }
        }
    }
}
