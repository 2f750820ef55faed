//! HTTP access to message logs and the operator session list

use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;

use helpline_shared::{Message, SessionId, SessionState};

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MessagesBody {
    messages: Vec<Message>,
}

/// Row of `GET /api/v1/admin/chat/sessions`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionListing {
    pub session_id: SessionId,
    pub user_identity: String,
    pub state: SessionState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HistoryClient {
    /// `base_url` is the `http://` or `https://` origin of the coordinator
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Full message log of a session, oldest first
    pub async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, ClientError> {
        let url = format!(
            "{}/api/v1/chat/sessions/{}/messages",
            self.base_url, session_id
        );
        let body: MessagesBody = self.get(&url).await?;
        Ok(body.messages)
    }

    /// Sessions that are still open. Operators only.
    pub async fn open_sessions(&self) -> Result<Vec<SessionListing>, ClientError> {
        let url = format!("{}/api/v1/admin/chat/sessions", self.base_url);
        self.get(&url).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ClientError> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "History request rejected");
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}
