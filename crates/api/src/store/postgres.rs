//! Postgres session store
//!
//! Schema lives in `migrations/`. Messages are ordered by a `BIGSERIAL`
//! sequence so that history follows insert order even when two rows share a
//! timestamp.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use helpline_shared::{Message, Session, SessionId};

use super::{SessionStore, StoreError};

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    user_identity: String,
    state: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    closed_at: Option<OffsetDateTime>,
    need_human_notified_at: Option<OffsetDateTime>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: SessionId::parse(&row.id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            user_identity: row.user_identity,
            state: row
                .state
                .parse()
                .map_err(|e: helpline_shared::ValidationError| StoreError::Corrupt(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
            need_human_notified_at: row.need_human_notified_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: String,
    role: String,
    body: String,
    sender_identity: Option<String>,
    sender_display_name: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            session_id: SessionId::parse(&row.session_id)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            role: row
                .role
                .parse()
                .map_err(|e: helpline_shared::ValidationError| StoreError::Corrupt(e.to_string()))?,
            body: row.body,
            sender_identity: row.sender_identity,
            sender_display_name: row.sender_display_name,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str =
    "id, user_identity, state, created_at, updated_at, closed_at, need_human_notified_at";

/// Session store backed by Postgres
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions
                (id, user_identity, state, created_at, updated_at, closed_at, need_human_notified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id.as_str())
        .bind(&session.user_identity)
        .bind(session.state.as_str())
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.closed_at)
        .bind(session.need_human_notified_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn find_open_session(&self, user_identity: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions \
             WHERE user_identity = $1 AND state <> 'closed' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_identity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn list_open_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions \
             WHERE state <> 'closed' ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        write_session_update(&self.pool, session).await
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        insert_message(&self.pool, message).await
    }

    async fn record(&self, session: &Session, message: &Message) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        write_session_update(&mut *tx, session).await?;
        insert_message(&mut *tx, message).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, role, body, sender_identity, sender_display_name, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn message_count(&self, id: &SessionId) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE session_id = $1")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn write_session_update<'e, E>(executor: E, session: &Session) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE chat_sessions
        SET state = $2, updated_at = $3, closed_at = $4, need_human_notified_at = $5
        WHERE id = $1
        "#,
    )
    .bind(session.id.as_str())
    .bind(session.state.as_str())
    .bind(session.updated_at)
    .bind(session.closed_at)
    .bind(session.need_human_notified_at)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::MissingSession(session.id.clone()));
    }
    Ok(())
}

async fn insert_message<'e, E>(executor: E, message: &Message) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO chat_messages
            (id, session_id, role, body, sender_identity, sender_display_name, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(message.id)
    .bind(message.session_id.as_str())
    .bind(message.role.as_str())
    .bind(&message.body)
    .bind(&message.sender_identity)
    .bind(&message.sender_display_name)
    .bind(message.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use helpline_shared::{create_pool, run_migrations, MessageRole, SessionState};

    async fn connect() -> PgSessionStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        PgSessionStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_session_round_trip_through_postgres() {
        let store = connect().await;
        let identity = format!("{}@example.com", Uuid::new_v4());
        let mut session = Session::open(identity.clone());
        store.create_session(&session).await.unwrap();

        for body in ["first", "second"] {
            let message = Message::new(session.id.clone(), MessageRole::User, body, None, None);
            store.append_message(&message).await.unwrap();
        }
        assert_eq!(store.message_count(&session.id).await.unwrap(), 2);

        session.state = SessionState::Closed;
        session.closed_at = Some(OffsetDateTime::now_utc());
        let notice = Message::system(session.id.clone(), "closed");
        store.record(&session, &notice).await.unwrap();
        assert_eq!(store.message_count(&session.id).await.unwrap(), 3);

        let loaded = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, SessionState::Closed);
        assert!(store.find_open_session(&identity).await.unwrap().is_none());
    }
}
