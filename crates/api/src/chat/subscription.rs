//! Subscribe/unsubscribe requests from connected endpoints
//!
//! Every check happens here; the room registry itself trusts its callers.
//! The server keeps nothing about an endpoint once it disconnects, so a
//! reconnecting client simply issues the same request again.

use std::sync::Arc;

use helpline_shared::{ActorRole, SessionId, ValidationError};

use crate::store::{SessionStore, StoreError};
use crate::websocket::connection::Connection;
use crate::websocket::room::RoomRegistry;

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Session not found: {0}")]
    UnknownSession(SessionId),

    #[error("Session {0} belongs to another user")]
    Unauthorized(SessionId),

    #[error("Role {0} is not available to this actor")]
    Forbidden(ActorRole),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl SubscribeError {
    pub fn code(&self) -> &'static str {
        match self {
            SubscribeError::Validation(_) => "validation_error",
            SubscribeError::UnknownSession(_) => "unknown_session",
            SubscribeError::Unauthorized(_) => "unauthorized",
            SubscribeError::Forbidden(_) => "forbidden",
            SubscribeError::Storage(_) => "storage_unavailable",
        }
    }
}

pub struct SubscriptionManager {
    store: Arc<dyn SessionStore>,
    rooms: Arc<RoomRegistry>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn SessionStore>, rooms: Arc<RoomRegistry>) -> Self {
        Self { store, rooms }
    }

    /// Join `conn` to a session room after checking the caller may see it
    ///
    /// Users may only subscribe to their own sessions; admins may subscribe to
    /// any. Subscribing to a closed session is allowed so its log stays live
    /// for whoever has it open.
    pub async fn request_subscribe(
        &self,
        conn: &Arc<Connection>,
        session_id: &str,
        role: ActorRole,
    ) -> Result<SessionId, SubscribeError> {
        let session_id = SessionId::parse(session_id)?;

        if role == ActorRole::Admin && !conn.actor.is_admin() {
            tracing::warn!(
                endpoint_id = %conn.endpoint_id,
                identity = %conn.actor.identity,
                "Non-admin endpoint asked for an admin subscription"
            );
            return Err(SubscribeError::Forbidden(role));
        }

        let session = self
            .store
            .get_session(&session_id)
            .await?
            .ok_or_else(|| SubscribeError::UnknownSession(session_id.clone()))?;

        if role == ActorRole::User && !session.is_owned_by(&conn.actor.identity) {
            return Err(SubscribeError::Unauthorized(session_id));
        }

        self.rooms
            .subscribe(Arc::clone(conn), role, session_id.clone())
            .await;
        Ok(session_id)
    }

    /// Leave a session room. Returns whether the endpoint was subscribed.
    pub async fn unsubscribe(
        &self,
        conn: &Connection,
        session_id: &str,
    ) -> Result<bool, SubscribeError> {
        let session_id = SessionId::parse(session_id)?;
        Ok(self.rooms.unsubscribe(conn.endpoint_id, &session_id).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;
    use helpline_shared::{Actor, Session};
    use tokio::sync::mpsc;

    struct Fixture {
        manager: SubscriptionManager,
        rooms: Arc<RoomRegistry>,
        session: Session,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemorySessionStore::new());
        let session = Session::open("amy@example.com");
        store.create_session(&session).await.unwrap();
        let rooms = Arc::new(RoomRegistry::new());
        Fixture {
            manager: SubscriptionManager::new(store, Arc::clone(&rooms)),
            rooms,
            session,
        }
    }

    fn endpoint(actor: Actor) -> Arc<Connection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(Connection::new(actor, tx))
    }

    #[tokio::test]
    async fn test_owner_can_subscribe() {
        let f = fixture().await;
        let conn = endpoint(Actor::user("amy@example.com"));

        let id = f
            .manager
            .request_subscribe(&conn, f.session.id.as_str(), ActorRole::User)
            .await
            .unwrap();
        assert_eq!(id, f.session.id);
        assert!(f.rooms.is_subscribed(conn.endpoint_id, &id).await);
    }

    #[tokio::test]
    async fn test_other_user_is_unauthorized() {
        let f = fixture().await;
        let conn = endpoint(Actor::user("bob@example.com"));

        let result = f
            .manager
            .request_subscribe(&conn, f.session.id.as_str(), ActorRole::User)
            .await;
        assert!(matches!(result, Err(SubscribeError::Unauthorized(_))));
        assert_eq!(f.rooms.room_size(&f.session.id).await, 0);
    }

    #[tokio::test]
    async fn test_admin_can_subscribe_to_any_session() {
        let f = fixture().await;
        let conn = endpoint(Actor::admin("ops@example.com"));

        f.manager
            .request_subscribe(&conn, f.session.id.as_str(), ActorRole::Admin)
            .await
            .unwrap();
        assert_eq!(f.rooms.room_size(&f.session.id).await, 1);
    }

    #[tokio::test]
    async fn test_user_cannot_claim_admin_role() {
        let f = fixture().await;
        let conn = endpoint(Actor::user("amy@example.com"));

        let result = f
            .manager
            .request_subscribe(&conn, f.session.id.as_str(), ActorRole::Admin)
            .await;
        assert!(matches!(result, Err(SubscribeError::Forbidden(ActorRole::Admin))));
    }

    #[tokio::test]
    async fn test_empty_and_unknown_ids_are_rejected() {
        let f = fixture().await;
        let conn = endpoint(Actor::admin("ops@example.com"));

        let empty = f.manager.request_subscribe(&conn, "  ", ActorRole::Admin).await;
        assert!(matches!(
            empty,
            Err(SubscribeError::Validation(ValidationError::EmptySessionId))
        ));

        let unknown = f
            .manager
            .request_subscribe(&conn, "does-not-exist", ActorRole::Admin)
            .await;
        assert!(matches!(unknown, Err(SubscribeError::UnknownSession(_))));
        assert_eq!(unknown.unwrap_err().code(), "unknown_session");
    }

    #[tokio::test]
    async fn test_resubscribe_is_idempotent_and_unsubscribe_works() {
        let f = fixture().await;
        let conn = endpoint(Actor::user("amy@example.com"));
        let id = f.session.id.as_str();

        f.manager.request_subscribe(&conn, id, ActorRole::User).await.unwrap();
        f.manager.request_subscribe(&conn, id, ActorRole::User).await.unwrap();
        assert_eq!(f.rooms.room_size(&f.session.id).await, 1);

        assert!(f.manager.unsubscribe(&conn, id).await.unwrap());
        assert!(!f.manager.unsubscribe(&conn, id).await.unwrap());
    }
}
