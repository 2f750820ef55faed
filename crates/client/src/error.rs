//! Client error types

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed server event: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Connection closed")]
    Closed,
}

impl ClientError {
    /// Whether reconnecting could help
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_) | ClientError::Transport(_) | ClientError::Closed
        )
    }
}
