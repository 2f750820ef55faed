//! Session lifecycle state machine
//!
//! ```text
//! ai_handled ──request human──▶ human_requested ──admin reply──▶ human_active
//!      │                              │                              │
//!      └──────────admin reply─────────┼──────────────────────────────┘
//!                                     ▼
//!                  user left / admin closed ──▶ closed (terminal)
//! ```
//!
//! The machine is pure: it mutates the in-memory [`Session`] and reports what
//! the caller must do (call the AI responder, notify admins). Persisting the
//! result is the caller's job.

use std::time::Duration;

use helpline_shared::{Session, SessionId, SessionState};
use time::OffsetDateTime;

/// Something that happened to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationEvent {
    /// The owner sent a chat message
    UserMessage,
    /// The owner asked for a human operator
    HumanRequested,
    /// An operator replied
    AdminReply,
    /// The owner left or stayed disconnected
    UserLeft,
    /// An operator ended the conversation
    AdminClosed,
}

/// Outcome of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// The AI responder should answer this user message
    pub ai_reply: bool,
    /// Admins should receive a `need_human` notice
    pub notify_admins: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscalationError {
    #[error("Session {0} is closed")]
    SessionClosed(SessionId),
}

#[derive(Debug, Clone)]
pub struct EscalationStateMachine {
    need_human_debounce: time::Duration,
}

impl EscalationStateMachine {
    /// `need_human_debounce` bounds how often a session still waiting for a
    /// human may re-notify admins.
    pub fn new(need_human_debounce: Duration) -> Self {
        Self {
            need_human_debounce: time::Duration::try_from(need_human_debounce)
                .unwrap_or(time::Duration::MAX),
        }
    }

    /// Apply `event` to `session` at time `now`
    pub fn apply(
        &self,
        session: &mut Session,
        event: EscalationEvent,
        now: OffsetDateTime,
    ) -> Result<Transition, EscalationError> {
        let from = session.state;
        if from.is_closed() {
            return Err(EscalationError::SessionClosed(session.id.clone()));
        }

        let mut ai_reply = false;
        let mut notify_admins = false;

        let to = match event {
            EscalationEvent::UserMessage => {
                ai_reply = from.allows_ai_reply();
                from
            }
            EscalationEvent::HumanRequested => match from {
                SessionState::AiHandled => {
                    notify_admins = true;
                    SessionState::HumanRequested
                }
                SessionState::HumanRequested => {
                    notify_admins = self.debounce_elapsed(session, now);
                    SessionState::HumanRequested
                }
                other => other,
            },
            EscalationEvent::AdminReply => SessionState::HumanActive,
            EscalationEvent::UserLeft | EscalationEvent::AdminClosed => SessionState::Closed,
        };

        session.state = to;
        session.updated_at = now;
        if to.is_closed() {
            session.closed_at = Some(now);
        }
        if notify_admins {
            session.need_human_notified_at = Some(now);
        }

        if from != to {
            tracing::info!(
                session_id = %session.id,
                from = %from,
                to = %to,
                event = ?event,
                "Session state transition"
            );
        }

        Ok(Transition {
            from,
            to,
            ai_reply,
            notify_admins,
        })
    }

    fn debounce_elapsed(&self, session: &Session, now: OffsetDateTime) -> bool {
        match session.need_human_notified_at {
            Some(at) => now - at >= self.need_human_debounce,
            None => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    fn machine() -> EscalationStateMachine {
        EscalationStateMachine::new(Duration::from_secs(60))
    }

    #[test]
    fn test_user_message_gets_ai_reply_only_while_ai_handled() {
        let m = machine();
        let now = OffsetDateTime::now_utc();
        let mut session = Session::open("amy@example.com");

        let t = m.apply(&mut session, EscalationEvent::UserMessage, now).unwrap();
        assert!(t.ai_reply);
        assert!(!t.changed());

        session.state = SessionState::HumanRequested;
        let t = m.apply(&mut session, EscalationEvent::UserMessage, now).unwrap();
        assert!(!t.ai_reply);

        session.state = SessionState::HumanActive;
        let t = m.apply(&mut session, EscalationEvent::UserMessage, now).unwrap();
        assert!(!t.ai_reply);
    }

    #[test]
    fn test_request_human_notifies_once_within_debounce() {
        let m = machine();
        let now = OffsetDateTime::now_utc();
        let mut session = Session::open("amy@example.com");

        let first = m.apply(&mut session, EscalationEvent::HumanRequested, now).unwrap();
        assert_eq!(first.to, SessionState::HumanRequested);
        assert!(first.notify_admins);
        assert_eq!(session.need_human_notified_at, Some(now));

        let again = m
            .apply(&mut session, EscalationEvent::HumanRequested, now + time::Duration::seconds(10))
            .unwrap();
        assert!(!again.notify_admins);

        let later = m
            .apply(&mut session, EscalationEvent::HumanRequested, now + time::Duration::seconds(61))
            .unwrap();
        assert!(later.notify_admins);
    }

    #[test]
    fn test_request_human_while_human_active_is_silent() {
        let m = machine();
        let now = OffsetDateTime::now_utc();
        let mut session = Session::open("amy@example.com");
        session.state = SessionState::HumanActive;

        let t = m.apply(&mut session, EscalationEvent::HumanRequested, now).unwrap();
        assert_eq!(t.to, SessionState::HumanActive);
        assert!(!t.notify_admins);
    }

    #[test]
    fn test_admin_reply_activates_from_any_open_state() {
        let m = machine();
        let now = OffsetDateTime::now_utc();
        for state in [
            SessionState::AiHandled,
            SessionState::HumanRequested,
            SessionState::HumanActive,
        ] {
            let mut session = Session::open("amy@example.com");
            session.state = state;
            let t = m.apply(&mut session, EscalationEvent::AdminReply, now).unwrap();
            assert_eq!(t.to, SessionState::HumanActive);
            assert!(!t.ai_reply);
        }
    }

    #[test]
    fn test_leave_closes_and_closed_is_terminal() {
        let m = machine();
        let now = OffsetDateTime::now_utc();
        let mut session = Session::open("amy@example.com");

        let t = m.apply(&mut session, EscalationEvent::UserLeft, now).unwrap();
        assert_eq!(t.to, SessionState::Closed);
        assert_eq!(session.closed_at, Some(now));

        for event in [
            EscalationEvent::UserMessage,
            EscalationEvent::HumanRequested,
            EscalationEvent::AdminReply,
            EscalationEvent::AdminClosed,
        ] {
            assert_eq!(
                m.apply(&mut session, event, now),
                Err(EscalationError::SessionClosed(session.id.clone()))
            );
        }
    }
}
