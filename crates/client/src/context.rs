//! Current-session context for the user chat widget
//!
//! Holds the one session the widget is talking in. Set when the server
//! accepts a message into a session, flagged when the user escalates, and
//! cleared when the server says the session is over.

use helpline_shared::{ServerEvent, SessionId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSessionContext {
    session_id: Option<SessionId>,
    escalated: bool,
}

impl ClientSessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// The server placed our conversation in `session_id`
    pub fn accept(&mut self, session_id: SessionId) {
        // A request made before the first message carries over to the new session
        if self.session_id.as_ref().is_some_and(|current| current != &session_id) {
            self.escalated = false;
        }
        self.session_id = Some(session_id);
    }

    /// The user asked for a human
    pub fn escalate(&mut self) {
        self.escalated = true;
    }

    pub fn clear(&mut self) {
        self.session_id = None;
        self.escalated = false;
    }

    /// Follow the server's view of our session. Returns whether anything changed.
    pub fn observe(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::MsgAdded { session_id, .. } => {
                if self.session_id.as_ref() == Some(session_id) {
                    return false;
                }
                self.accept(session_id.clone());
                true
            }
            ServerEvent::UserLeft { session_id, .. }
            | ServerEvent::SessionClosed { session_id, .. }
                if self.session_id.as_ref() == Some(session_id) =>
            {
                self.clear();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpline_shared::{Message, MessageRole};

    fn msg_added(session_id: &SessionId) -> ServerEvent {
        ServerEvent::msg_added(&Message::new(
            session_id.clone(),
            MessageRole::Ai,
            "hi",
            None,
            None,
        ))
    }

    #[test]
    fn test_first_message_sets_context() {
        let mut ctx = ClientSessionContext::new();
        let id = SessionId::new();

        assert!(ctx.observe(&msg_added(&id)));
        assert_eq!(ctx.current(), Some(&id));
        assert!(!ctx.observe(&msg_added(&id)));
    }

    #[test]
    fn test_close_clears_only_current_session() {
        let mut ctx = ClientSessionContext::new();
        let id = SessionId::new();
        ctx.accept(id.clone());
        ctx.escalate();

        let other = ServerEvent::SessionClosed {
            session_id: SessionId::new(),
            closed_by: "ops@example.com".into(),
            message: "closed".into(),
        };
        assert!(!ctx.observe(&other));
        assert!(ctx.is_escalated());

        let ours = ServerEvent::UserLeft {
            session_id: id,
            user_identity: "amy@example.com".into(),
            message: "left".into(),
        };
        assert!(ctx.observe(&ours));
        assert_eq!(ctx.current(), None);
        assert!(!ctx.is_escalated());
    }

    #[test]
    fn test_new_session_resets_escalation() {
        let mut ctx = ClientSessionContext::new();
        ctx.accept(SessionId::new());
        ctx.escalate();

        ctx.observe(&msg_added(&SessionId::new()));
        assert!(!ctx.is_escalated());
    }
}
