//! AI auto-responder
//!
//! The responder is an opaque collaborator: given a user's query it returns
//! reply text or fails. Callers bound every call with a timeout and treat any
//! failure as "no AI reply".

pub mod circuit_breaker;
pub mod http;

use async_trait::async_trait;
use helpline_shared::SessionId;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use http::HttpAiResponder;

/// One question put to the responder
#[derive(Debug, Clone, Copy)]
pub struct AiQuery<'a> {
    pub session_id: &'a SessionId,
    pub user_identity: &'a str,
    pub query: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI responder is not configured")]
    Disabled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI backend returned status {0}")]
    Status(u16),

    #[error("Invalid response from AI backend")]
    InvalidResponse,

    #[error("AI backend circuit is open")]
    CircuitOpen,
}

#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn respond(&self, query: AiQuery<'_>) -> Result<String, AiError>;
}

/// Responder used when no AI backend is configured. Every call degrades.
pub struct DisabledResponder;

#[async_trait]
impl AiResponder for DisabledResponder {
    async fn respond(&self, _query: AiQuery<'_>) -> Result<String, AiError> {
        Err(AiError::Disabled)
    }
}
