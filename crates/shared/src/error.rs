//! Error types for Helpline

use thiserror::Error;

/// Input rejected before it reaches the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("session_id must not be empty")]
    EmptySessionId,

    #[error("session_id is malformed: {0}")]
    MalformedSessionId(String),

    #[error("message body must not be empty")]
    EmptyBody,

    #[error("message body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
