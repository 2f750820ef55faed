//! Chat coordinator
//!
//! The single entry point used by both the `/chat` socket and the HTTP routes.
//! It serializes work per session, runs the ingestion pipeline and hands the
//! resulting events to the room registry.

use std::sync::Arc;
use std::time::Duration;

use helpline_shared::{Actor, ActorRole, Message, ServerEvent, Session, SessionId};

use super::ingest::{
    CloseOutcome, EscalationOutcome, IngestError, IngestOutcome, IngestRequest, IngestionPipeline,
    Outbound,
};
use super::locks::KeyedLocks;
use super::subscription::{SubscribeError, SubscriptionManager};
use crate::websocket::connection::Connection;
use crate::websocket::room::RoomRegistry;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// How long a user's session survives with none of their endpoints
    /// subscribed before it is closed
    pub disconnect_grace: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            disconnect_grace: Duration::from_secs(5),
        }
    }
}

pub struct ChatCoordinator {
    pipeline: IngestionPipeline,
    subscriptions: SubscriptionManager,
    rooms: Arc<RoomRegistry>,
    locks: KeyedLocks,
    settings: CoordinatorSettings,
}

impl ChatCoordinator {
    pub fn new(
        pipeline: IngestionPipeline,
        rooms: Arc<RoomRegistry>,
        settings: CoordinatorSettings,
    ) -> Self {
        let subscriptions = SubscriptionManager::new(Arc::clone(pipeline.store()), Arc::clone(&rooms));
        Self {
            pipeline,
            subscriptions,
            rooms,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    /// Register a freshly connected endpoint
    pub async fn attach(&self, conn: &Arc<Connection>) {
        if conn.actor.is_admin() {
            self.rooms.join_admin_audience(Arc::clone(conn)).await;
        }
        let _ = conn.send(ServerEvent::Connected {
            endpoint_id: conn.endpoint_id,
        });
    }

    pub async fn subscribe(
        &self,
        conn: &Arc<Connection>,
        session_id: &str,
        role: ActorRole,
    ) -> Result<SessionId, SubscribeError> {
        self.subscriptions.request_subscribe(conn, session_id, role).await
    }

    pub async fn unsubscribe(
        &self,
        conn: &Connection,
        session_id: &str,
    ) -> Result<bool, SubscribeError> {
        self.subscriptions.unsubscribe(conn, session_id).await
    }

    /// Ingest a message and fan out its events
    ///
    /// When the message arrived over a socket, that endpoint is joined to the
    /// resolved session before fan-out so it sees its own echo and the reply.
    pub async fn ingest(
        &self,
        origin: Option<&Arc<Connection>>,
        request: IngestRequest,
    ) -> Result<IngestOutcome, IngestError> {
        let key = match request.sender.role {
            ActorRole::User => request.sender.identity.clone(),
            ActorRole::Admin => {
                let session_id = request
                    .session_id
                    .as_ref()
                    .ok_or(IngestError::MissingSessionId)?;
                self.pipeline.owner_of(session_id).await?
            }
        };

        let _guard = self.locks.lock(&key).await;
        let outcome = self.pipeline.ingest(request).await?;
        self.join_origin(origin, &outcome.session.id).await;
        self.dispatch(&outcome.events).await;
        Ok(outcome)
    }

    pub async fn request_human(
        &self,
        origin: Option<&Arc<Connection>>,
        actor: &Actor,
    ) -> Result<EscalationOutcome, IngestError> {
        let _guard = self.locks.lock(&actor.identity).await;
        let outcome = self.pipeline.request_human(actor).await?;
        self.join_origin(origin, &outcome.session.id).await;
        self.dispatch(&outcome.events).await;
        Ok(outcome)
    }

    /// The user explicitly ends their open conversation
    pub async fn leave(&self, actor: &Actor) -> Result<Option<CloseOutcome>, IngestError> {
        if actor.is_admin() {
            return Err(IngestError::Forbidden("admins close sessions instead".into()));
        }
        let _guard = self.locks.lock(&actor.identity).await;
        let outcome = self.pipeline.close_for_user(&actor.identity, None).await?;
        if let Some(outcome) = &outcome {
            self.dispatch(&outcome.events).await;
        }
        Ok(outcome)
    }

    pub async fn close_session(
        &self,
        actor: &Actor,
        session_id: &SessionId,
    ) -> Result<CloseOutcome, IngestError> {
        if !actor.is_admin() {
            return Err(IngestError::Forbidden("only admins can close sessions".into()));
        }
        let owner = self.pipeline.owner_of(session_id).await?;
        let _guard = self.locks.lock(&owner).await;
        let outcome = self.pipeline.close_by_admin(actor, session_id).await?;
        self.dispatch(&outcome.events).await;
        Ok(outcome)
    }

    /// Tear down an endpoint and schedule closing of abandoned user sessions
    pub async fn disconnect(self: &Arc<Self>, conn: &Arc<Connection>) {
        let removed = self.rooms.on_disconnect(conn.endpoint_id).await;
        if conn.actor.is_admin() {
            return;
        }

        for (session_id, role) in removed {
            if role != ActorRole::User {
                continue;
            }
            let identity = conn.actor.identity.clone();
            let grace = self.settings.disconnect_grace;
            if grace.is_zero() {
                self.close_if_abandoned(&identity, &session_id).await;
            } else {
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    coordinator.close_if_abandoned(&identity, &session_id).await;
                });
            }
        }
    }

    async fn close_if_abandoned(&self, identity: &str, session_id: &SessionId) {
        let _guard = self.locks.lock(identity).await;
        if self.rooms.has_user_subscriber(session_id, identity).await {
            tracing::debug!(
                session_id = %session_id,
                user_identity = %identity,
                "User reconnected within grace period - session kept open"
            );
            return;
        }

        match self.pipeline.close_for_user(identity, Some(session_id)).await {
            Ok(Some(outcome)) => {
                tracing::info!(
                    session_id = %session_id,
                    user_identity = %identity,
                    "Session closed after user disconnect"
                );
                self.dispatch(&outcome.events).await;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %err,
                    "Failed to close session after disconnect"
                );
            }
        }
    }

    pub async fn history(
        &self,
        actor: &Actor,
        session_id: &SessionId,
    ) -> Result<Vec<Message>, IngestError> {
        self.pipeline.history(actor, session_id).await
    }

    pub async fn open_sessions(&self, actor: &Actor) -> Result<Vec<Session>, IngestError> {
        self.pipeline.list_open_sessions(actor).await
    }

    async fn join_origin(&self, origin: Option<&Arc<Connection>>, session_id: &SessionId) {
        if let Some(conn) = origin {
            self.rooms
                .subscribe(Arc::clone(conn), conn.actor.role, session_id.clone())
                .await;
        }
    }

    async fn dispatch(&self, events: &[Outbound]) {
        for outbound in events {
            self.rooms
                .deliver(&outbound.audience, outbound.event.clone())
                .await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use crate::ai::DisabledResponder;
    use crate::chat::escalation::EscalationStateMachine;
    use crate::store::{InMemorySessionStore, SessionStore};
    use helpline_shared::SessionState;
    use tokio::sync::mpsc;

    fn coordinator(grace: Duration) -> (Arc<ChatCoordinator>, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let pipeline = IngestionPipeline::new(
            store.clone(),
            Arc::new(DisabledResponder),
            EscalationStateMachine::new(Duration::from_secs(60)),
            Duration::from_millis(100),
            4000,
        );
        let coordinator = ChatCoordinator::new(
            pipeline,
            Arc::new(RoomRegistry::new()),
            CoordinatorSettings {
                disconnect_grace: grace,
            },
        );
        (Arc::new(coordinator), store)
    }

    fn endpoint(actor: Actor) -> (Arc<Connection>, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(Connection::new(actor, tx)), rx)
    }

    #[tokio::test]
    async fn test_attach_acknowledges_and_joins_admins() {
        let (coordinator, _store) = coordinator(Duration::ZERO);
        let (admin, mut rx) = endpoint(Actor::admin("ops@example.com"));

        coordinator.attach(&admin).await;

        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Connected { .. })));
        assert_eq!(coordinator.rooms().admin_count().await, 1);
    }

    #[tokio::test]
    async fn test_origin_endpoint_receives_its_own_message() {
        let (coordinator, _store) = coordinator(Duration::ZERO);
        let amy = Actor::user("amy@example.com");
        let (conn, mut rx) = endpoint(amy.clone());

        let outcome = coordinator
            .ingest(Some(&conn), IngestRequest::from_actor(amy, None, "hello"))
            .await
            .unwrap();

        assert!(outcome.ai_degraded);
        match rx.try_recv() {
            Ok(ServerEvent::MsgAdded { session_id, .. }) => assert_eq!(session_id, outcome.session.id),
            other => panic!("Expected msg_added, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reconnect_within_grace_keeps_session_open() {
        let (coordinator, store) = coordinator(Duration::from_millis(50));
        let amy = Actor::user("amy@example.com");
        let (first, _rx1) = endpoint(amy.clone());

        let outcome = coordinator
            .ingest(Some(&first), IngestRequest::from_actor(amy.clone(), None, "hello"))
            .await
            .unwrap();
        coordinator.disconnect(&first).await;

        let (second, _rx2) = endpoint(amy);
        coordinator
            .subscribe(&second, outcome.session.id.as_str(), ActorRole::User)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        let session = store.get_session(&outcome.session.id).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::AiHandled);
    }

    #[tokio::test]
    async fn test_disconnect_after_grace_closes_session() {
        let (coordinator, store) = coordinator(Duration::from_millis(20));
        let amy = Actor::user("amy@example.com");
        let (conn, _rx) = endpoint(amy.clone());

        let outcome = coordinator
            .ingest(Some(&conn), IngestRequest::from_actor(amy, None, "hello"))
            .await
            .unwrap();
        coordinator.disconnect(&conn).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let session = store.get_session(&outcome.session.id).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_admin_disconnect_never_closes() {
        let (coordinator, store) = coordinator(Duration::ZERO);
        let amy = Actor::user("amy@example.com");
        let opened = coordinator
            .ingest(None, IngestRequest::from_actor(amy, None, "hello"))
            .await
            .unwrap();

        let (admin, _rx) = endpoint(Actor::admin("ops@example.com"));
        coordinator
            .subscribe(&admin, opened.session.id.as_str(), ActorRole::Admin)
            .await
            .unwrap();
        coordinator.disconnect(&admin).await;

        let session = store.get_session(&opened.session.id).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::AiHandled);
    }
}
