//! In-memory session store
//!
//! Used when no `DATABASE_URL` is configured and throughout the tests.
//! Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use helpline_shared::{Message, Session, SessionId};

use super::{SessionStore, StoreError};

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    messages: HashMap<SessionId, Vec<Message>>,
}

/// Session store kept entirely in process memory
#[derive(Default)]
pub struct InMemorySessionStore {
    tables: RwLock<Tables>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_update(stored: &mut Session, session: &Session) {
    stored.state = session.state;
    stored.updated_at = session.updated_at;
    stored.closed_at = session.closed_at;
    stored.need_human_notified_at = session.need_human_notified_at;
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        let already_open = !session.state.is_closed()
            && tables
                .sessions
                .values()
                .any(|s| s.user_identity == session.user_identity && !s.state.is_closed());
        if already_open {
            return Err(StoreError::Conflict(format!(
                "{} already has an open session",
                session.user_identity
            )));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        tables.messages.insert(session.id.clone(), Vec::new());
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn find_open_session(&self, user_identity: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.user_identity == user_identity && !s.state.is_closed())
            .cloned())
    }

    async fn list_open_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let tables = self.tables.read().await;
        let mut open: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| !s.state.is_closed())
            .cloned()
            .collect();
        open.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(open)
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StoreError::MissingSession(session.id.clone()))?;
        apply_update(stored, session);
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let log = tables
            .messages
            .get_mut(&message.session_id)
            .ok_or_else(|| StoreError::MissingSession(message.session_id.clone()))?;
        log.push(message.clone());
        Ok(())
    }

    async fn record(&self, session: &Session, message: &Message) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.messages.contains_key(&message.session_id) {
            return Err(StoreError::MissingSession(message.session_id.clone()));
        }
        let stored = tables
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StoreError::MissingSession(session.id.clone()))?;
        apply_update(stored, session);
        if let Some(log) = tables.messages.get_mut(&message.session_id) {
            log.push(message.clone());
        }
        Ok(())
    }

    async fn list_messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        tables
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::MissingSession(id.clone()))
    }

    async fn message_count(&self, id: &SessionId) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        tables
            .messages
            .get(id)
            .map(|log| log.len() as u64)
            .ok_or_else(|| StoreError::MissingSession(id.clone()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use helpline_shared::{MessageRole, SessionState};

    #[tokio::test]
    async fn test_create_and_find_open_session() {
        let store = InMemorySessionStore::new();
        let session = Session::open("amy@example.com");
        store.create_session(&session).await.unwrap();

        let found = store.find_open_session("amy@example.com").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(session.id.clone()));
        assert!(store.find_open_session("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_session_for_user_is_rejected() {
        let store = InMemorySessionStore::new();
        store
            .create_session(&Session::open("amy@example.com"))
            .await
            .unwrap();

        let result = store.create_session(&Session::open("amy@example.com")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_closed_session_frees_the_user() {
        let store = InMemorySessionStore::new();
        let mut session = Session::open("amy@example.com");
        store.create_session(&session).await.unwrap();

        session.state = SessionState::Closed;
        store.update_session(&session).await.unwrap();

        assert!(store.find_open_session("amy@example.com").await.unwrap().is_none());
        store
            .create_session(&Session::open("amy@example.com"))
            .await
            .unwrap();
        assert_eq!(store.list_open_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_messages_keep_append_order() {
        let store = InMemorySessionStore::new();
        let session = Session::open("amy@example.com");
        store.create_session(&session).await.unwrap();

        for body in ["one", "two", "three"] {
            let message = Message::new(session.id.clone(), MessageRole::User, body, None, None);
            store.append_message(&message).await.unwrap();
        }

        let bodies: Vec<String> = store
            .list_messages(&session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
        assert_eq!(store.message_count(&session.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_fails() {
        let store = InMemorySessionStore::new();
        let message = Message::system(SessionId::new(), "orphan");
        let result = store.append_message(&message).await;
        assert!(matches!(result, Err(StoreError::MissingSession(_))));
    }

    #[tokio::test]
    async fn test_record_leaves_session_untouched_when_message_is_rejected() {
        let store = InMemorySessionStore::new();
        let mut session = Session::open("amy@example.com");
        store.create_session(&session).await.unwrap();

        session.state = SessionState::HumanActive;
        let orphan = Message::system(SessionId::new(), "orphan");
        let result = store.record(&session, &orphan).await;
        assert!(matches!(result, Err(StoreError::MissingSession(_))));

        let stored = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::AiHandled);
        assert_eq!(store.message_count(&session.id).await.unwrap(), 0);

        let reply = Message::new(session.id.clone(), MessageRole::Admin, "on it", None, None);
        store.record(&session, &reply).await.unwrap();
        let stored = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::HumanActive);
        assert_eq!(store.message_count(&session.id).await.unwrap(), 1);
    }
}
