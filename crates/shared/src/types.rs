//! Common types used across Helpline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Longest session id accepted from the outside world.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Support session identifier.
///
/// Session ids are opaque strings from the moment they are allocated. They are
/// never parsed as numbers and never compared against any other representation:
/// a JSON number in a `session_id` field fails to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Canonicalize an identifier received from a client or storage.
    ///
    /// Surrounding whitespace is stripped; everything else is kept verbatim.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySessionId);
        }
        if trimmed.len() > MAX_SESSION_ID_LEN {
            return Err(ValidationError::MalformedSessionId(format!(
                "longer than {MAX_SESSION_ID_LEN} characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::MalformedSessionId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SessionId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Connected endpoint ID wrapper (one per WebSocket connection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub Uuid);

impl EndpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EndpointId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of a support session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AiHandled,
    HumanRequested,
    HumanActive,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AiHandled => "ai_handled",
            SessionState::HumanRequested => "human_requested",
            SessionState::HumanActive => "human_active",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// The AI responder only answers while nobody has asked for a human.
    pub fn allows_ai_reply(&self) -> bool {
        matches!(self, SessionState::AiHandled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai_handled" => Ok(SessionState::AiHandled),
            "human_requested" => Ok(SessionState::HumanRequested),
            "human_active" => Ok(SessionState::HumanActive),
            "closed" => Ok(SessionState::Closed),
            other => Err(ValidationError::UnknownVariant {
                kind: "session state",
                value: other.to_string(),
            }),
        }
    }
}

/// Author role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Ai,
    Admin,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Ai => "ai",
            MessageRole::Admin => "admin",
            MessageRole::System => "system",
        }
    }

    /// Name shown when the sender did not supply one
    pub fn default_display_name(&self) -> &'static str {
        match self {
            MessageRole::User => "User",
            MessageRole::Ai => "Assistant",
            MessageRole::Admin => "Support",
            MessageRole::System => "System",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "ai" => Ok(MessageRole::Ai),
            "admin" => Ok(MessageRole::Admin),
            "system" => Ok(MessageRole::System),
            other => Err(ValidationError::UnknownVariant {
                kind: "message role",
                value: other.to_string(),
            }),
        }
    }
}

/// Role of an authenticated actor, also used as the role of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    User,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::User => "user",
            ActorRole::Admin => "admin",
        }
    }

    pub fn message_role(&self) -> MessageRole {
        match self {
            ActorRole::User => MessageRole::User,
            ActorRole::Admin => MessageRole::Admin,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ActorRole::User),
            "admin" => Ok(ActorRole::Admin),
            other => Err(ValidationError::UnknownVariant {
                kind: "actor role",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// The authenticated caller, as resolved by the auth layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity, e.g. an email address
    pub identity: String,
    pub role: ActorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Actor {
    pub fn user(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role: ActorRole::User,
            display_name: None,
        }
    }

    pub fn admin(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role: ActorRole::Admin,
            display_name: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// One user's support conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_identity: String,
    pub state: SessionState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    /// When admins were last notified that this session wants a human
    #[serde(with = "time::serde::rfc3339::option")]
    pub need_human_notified_at: Option<OffsetDateTime>,
}

impl Session {
    /// A freshly allocated session, handled by the AI responder
    pub fn open(user_identity: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: SessionId::new(),
            user_identity: user_identity.into(),
            state: SessionState::AiHandled,
            created_at: now,
            updated_at: now,
            closed_at: None,
            need_human_notified_at: None,
        }
    }

    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.user_identity == identity
    }
}

/// One turn in a session. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn new(
        session_id: SessionId,
        role: MessageRole,
        body: impl Into<String>,
        sender_identity: Option<String>,
        sender_display_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role,
            body: body.into(),
            sender_identity,
            sender_display_name,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// A system marker such as "user requested a human"
    pub fn system(session_id: SessionId, body: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::System, body, None, None)
    }

    /// Display name, falling back to the role default
    pub fn display_name(&self) -> &str {
        self.sender_display_name
            .as_deref()
            .unwrap_or_else(|| self.role.default_display_name())
    }
}

/// Validate and normalize an inbound message body
pub fn validate_body(body: &str, limit: usize) -> Result<String, ValidationError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    if trimmed.len() > limit {
        return Err(ValidationError::BodyTooLarge { limit });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn test_session_id_parse_trims_and_keeps_case() {
        let id = SessionId::parse("  AbC-123_x ").unwrap();
        assert_eq!(id.as_str(), "AbC-123_x");
    }

    #[test]
    fn test_session_id_rejects_empty_and_malformed() {
        assert_eq!(SessionId::parse("   "), Err(ValidationError::EmptySessionId));
        assert!(matches!(
            SessionId::parse("a b"),
            Err(ValidationError::MalformedSessionId(_))
        ));
        assert!(SessionId::parse(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_session_id_rejects_numeric_json() {
        let numeric: Result<SessionId, _> = serde_json::from_str("42");
        assert!(numeric.is_err());

        let text: SessionId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(text.as_str(), "42");
    }

    #[test]
    fn test_state_gates_ai_reply() {
        assert!(SessionState::AiHandled.allows_ai_reply());
        assert!(!SessionState::HumanRequested.allows_ai_reply());
        assert!(!SessionState::HumanActive.allows_ai_reply());
        assert!(!SessionState::Closed.allows_ai_reply());
    }

    #[test]
    fn test_state_text_form_matches_serde() {
        for state in [
            SessionState::AiHandled,
            SessionState::HumanRequested,
            SessionState::HumanActive,
            SessionState::Closed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
    }

    #[test]
    fn test_message_display_name_defaults_per_role() {
        let sid = SessionId::new();
        let ai = Message::new(sid.clone(), MessageRole::Ai, "hi", None, None);
        assert_eq!(ai.display_name(), "Assistant");

        let admin = Message::new(
            sid,
            MessageRole::Admin,
            "hello",
            Some("ops@example.com".into()),
            Some("Dana".into()),
        );
        assert_eq!(admin.display_name(), "Dana");
    }

    #[test]
    fn test_validate_body() {
        assert_eq!(validate_body("  hi  ", 10).unwrap(), "hi");
        assert_eq!(validate_body(" \n ", 10), Err(ValidationError::EmptyBody));
        assert_eq!(
            validate_body("0123456789ab", 10),
            Err(ValidationError::BodyTooLarge { limit: 10 })
        );
    }
}
