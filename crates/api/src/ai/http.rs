//! HTTP client for the AI backend
//!
//! Posts `{session_id, user_identity, query}` as JSON and expects
//! `{"reply": "..."}` back (`response` and `answer` are accepted as aliases).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use super::{AiError, AiQuery, AiResponder};

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
    session_id: &'a str,
    user_identity: &'a str,
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    #[serde(alias = "response", alias = "answer")]
    reply: String,
}

/// AI responder reached over HTTP
pub struct HttpAiResponder {
    http_client: Client,
    endpoint: String,
    api_key: Option<String>,
    breaker: CircuitBreaker,
}

impl HttpAiResponder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, AiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            breaker: CircuitBreaker::new(breaker),
        })
    }

    async fn send(&self, query: AiQuery<'_>) -> Result<String, AiError> {
        let mut request = self.http_client.post(&self.endpoint).json(&ReplyRequest {
            session_id: query.session_id.as_str(),
            user_identity: query.user_identity,
            query: query.query,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status(status.as_u16()));
        }

        let body: ReplyResponse = response
            .json()
            .await
            .map_err(|_| AiError::InvalidResponse)?;
        let reply = body.reply.trim();
        if reply.is_empty() {
            return Err(AiError::InvalidResponse);
        }
        Ok(reply.to_string())
    }
}

#[async_trait]
impl AiResponder for HttpAiResponder {
    async fn respond(&self, query: AiQuery<'_>) -> Result<String, AiError> {
        match self.breaker.call(|| self.send(query)).await {
            Ok(reply) => Ok(reply),
            Err(CircuitBreakerError::Rejected) => Err(AiError::CircuitOpen),
            Err(CircuitBreakerError::Inner(err)) => {
                tracing::warn!(
                    session_id = %query.session_id,
                    error = %err,
                    "AI backend call failed"
                );
                Err(err)
            }
        }
    }
}
