//! Durable storage of support sessions and their message logs
//!
//! The coordinator only talks to storage through [`SessionStore`]. Two
//! adapters ship with the crate: an in-memory store used by default and in
//! tests, and a Postgres store backed by `sqlx`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use helpline_shared::{Message, Session, SessionId};

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

/// Storage failure. Every variant is fatal to the operation that hit it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Session not found: {0}")]
    MissingSession(SessionId),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Storage unavailable")]
    Unavailable,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::Database(db_err) => {
                // PostgreSQL unique violation
                if db_err.code().as_deref() == Some("23505") {
                    return StoreError::Conflict(db_err.to_string());
                }
                StoreError::Database(db_err.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Unavailable,
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Append/query log of sessions and messages.
///
/// Implementations must return messages of a session in append order and must
/// refuse to create a second open session for the same user identity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// The user's session that is not yet closed, if any
    async fn find_open_session(&self, user_identity: &str) -> Result<Option<Session>, StoreError>;

    /// All sessions that are not closed, most recently updated first
    async fn list_open_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Overwrite the mutable fields (state and timestamps) of a session
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// Apply a session update and append the message that caused it as one
    /// write. Either both land or neither does.
    async fn record(&self, session: &Session, message: &Message) -> Result<(), StoreError>;

    async fn list_messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError>;

    async fn message_count(&self, id: &SessionId) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
