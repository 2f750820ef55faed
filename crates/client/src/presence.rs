//! Operator console presence cache
//!
//! Local view of the sessions an operator can see: an ordered session list,
//! per-session unread badges, the session currently open in the console, and
//! the sessions this console has seen end. Driven entirely by server events
//! plus the operator opening a session.

use std::collections::{HashMap, HashSet};

use helpline_shared::{ActorRole, ClientEvent, ServerEvent, SessionId};

/// One row in the console's session list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub session_id: SessionId,
    pub user_identity: Option<String>,
    pub unread: u32,
    pub needs_human: bool,
    pub last_message: Option<String>,
}

impl SessionEntry {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            user_identity: None,
            unread: 0,
            needs_human: false,
            last_message: None,
        }
    }
}

/// What the console should do after an event was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceUpdate {
    /// Nothing visible changed
    Unchanged,
    /// Append the message to the open conversation pane
    AppendToOpen,
    /// A badge changed on a background session
    Badge { session_id: SessionId, unread: u32 },
    /// A user is waiting for a human
    HumanRequested { session_id: SessionId },
    /// A session ended and was removed from the list
    Removed { session_id: SessionId },
    /// The open session ended; render the notice and close the pane
    OpenSessionEnded { session_id: SessionId, notice: String },
}

/// Requests produced by opening a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub session_id: SessionId,
    pub subscribe: ClientEvent,
}

#[derive(Debug, Default)]
pub struct ClientPresenceCache {
    order: Vec<SessionId>,
    entries: HashMap<SessionId, SessionEntry>,
    closed: HashSet<SessionId>,
    open: Option<SessionId>,
}

impl ClientPresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the list from a session listing, e.g. on startup
    pub fn track(&mut self, session_id: SessionId, user_identity: Option<String>) {
        self.closed.remove(&session_id);
        let entry = self.touch(&session_id);
        if user_identity.is_some() {
            entry.user_identity = user_identity;
        }
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn unread(&self, session_id: &SessionId) -> u32 {
        self.entries.get(session_id).map_or(0, |e| e.unread)
    }

    pub fn total_unread(&self) -> u32 {
        self.entries.values().map(|e| e.unread).sum()
    }

    pub fn open_session_id(&self) -> Option<&SessionId> {
        self.open.as_ref()
    }

    pub fn is_closed(&self, session_id: &SessionId) -> bool {
        self.closed.contains(session_id)
    }

    /// Make `session_id` the open conversation. Resets its badge and returns
    /// the subscribe request the caller must send. The caller also fetches
    /// the message log.
    pub fn open(&mut self, session_id: SessionId) -> OpenSession {
        let entry = self.touch(&session_id);
        entry.unread = 0;
        self.open = Some(session_id.clone());
        OpenSession {
            subscribe: ClientEvent::SubscribeToSession {
                session_id: session_id.as_str().to_string(),
                role: ActorRole::Admin,
            },
            session_id,
        }
    }

    pub fn apply(&mut self, event: &ServerEvent) -> PresenceUpdate {
        match event {
            ServerEvent::MsgAdded {
                session_id,
                message,
                ..
            } => {
                if self.closed.contains(session_id) {
                    return PresenceUpdate::Unchanged;
                }
                let is_open = self.open.as_ref() == Some(session_id);
                let entry = self.touch(session_id);
                entry.last_message = Some(message.clone());
                if is_open {
                    return PresenceUpdate::AppendToOpen;
                }
                entry.unread += 1;
                PresenceUpdate::Badge {
                    session_id: session_id.clone(),
                    unread: entry.unread,
                }
            }
            ServerEvent::NeedHuman {
                session_id,
                user_identity,
                ..
            } => {
                // A session this console saw end can be reopened by a new request
                self.closed.remove(session_id);
                let entry = self.touch(session_id);
                entry.needs_human = true;
                entry.user_identity = Some(user_identity.clone());
                PresenceUpdate::HumanRequested {
                    session_id: session_id.clone(),
                }
            }
            ServerEvent::UserLeft {
                session_id,
                message,
                ..
            }
            | ServerEvent::SessionClosed {
                session_id,
                message,
                ..
            } => self.end(session_id, message),
            _ => PresenceUpdate::Unchanged,
        }
    }

    fn end(&mut self, session_id: &SessionId, notice: &str) -> PresenceUpdate {
        self.closed.insert(session_id.clone());
        self.entries.remove(session_id);
        self.order.retain(|id| id != session_id);

        if self.open.as_ref() == Some(session_id) {
            self.open = None;
            return PresenceUpdate::OpenSessionEnded {
                session_id: session_id.clone(),
                notice: notice.to_string(),
            };
        }
        PresenceUpdate::Removed {
            session_id: session_id.clone(),
        }
    }

    /// Move the session to the top of the list, creating it if needed
    fn touch(&mut self, session_id: &SessionId) -> &mut SessionEntry {
        self.order.retain(|id| id != session_id);
        self.order.insert(0, session_id.clone());
        self.entries
            .entry(session_id.clone())
            .or_insert_with(|| SessionEntry::new(session_id.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use helpline_shared::{Message, MessageRole};

    fn msg(session_id: &SessionId, body: &str) -> ServerEvent {
        ServerEvent::msg_added(&Message::new(
            session_id.clone(),
            MessageRole::User,
            body,
            Some("amy@example.com".into()),
            None,
        ))
    }

    fn user_left(session_id: &SessionId) -> ServerEvent {
        ServerEvent::UserLeft {
            session_id: session_id.clone(),
            user_identity: "amy@example.com".into(),
            message: "The user has left the chat.".into(),
        }
    }

    fn need_human(session_id: &SessionId) -> ServerEvent {
        ServerEvent::NeedHuman {
            session_id: session_id.clone(),
            user_identity: "amy@example.com".into(),
            message_count: 3,
        }
    }

    #[test]
    fn test_background_messages_raise_badge() {
        let mut cache = ClientPresenceCache::new();
        let a = SessionId::new();
        let b = SessionId::new();
        cache.open(a.clone());

        assert_eq!(cache.apply(&msg(&a, "one")), PresenceUpdate::AppendToOpen);
        assert_eq!(cache.unread(&a), 0);

        cache.apply(&msg(&b, "one"));
        let update = cache.apply(&msg(&b, "two"));
        assert_eq!(
            update,
            PresenceUpdate::Badge {
                session_id: b.clone(),
                unread: 2
            }
        );
        assert_eq!(cache.total_unread(), 2);

        let first: Vec<_> = cache.sessions().map(|e| e.session_id.clone()).collect();
        assert_eq!(first, vec![b, a]);
    }

    #[test]
    fn test_open_resets_badge_and_requests_subscribe() {
        let mut cache = ClientPresenceCache::new();
        let a = SessionId::new();
        cache.apply(&msg(&a, "hello"));
        assert_eq!(cache.unread(&a), 1);

        let open = cache.open(a.clone());
        assert_eq!(cache.unread(&a), 0);
        assert_eq!(cache.open_session_id(), Some(&a));
        assert_eq!(
            open.subscribe,
            ClientEvent::SubscribeToSession {
                session_id: a.as_str().to_string(),
                role: ActorRole::Admin,
            }
        );
    }

    #[test]
    fn test_user_left_on_open_session_ends_pane() {
        let mut cache = ClientPresenceCache::new();
        let a = SessionId::new();
        cache.open(a.clone());

        match cache.apply(&user_left(&a)) {
            PresenceUpdate::OpenSessionEnded { session_id, notice } => {
                assert_eq!(session_id, a);
                assert_eq!(notice, "The user has left the chat.");
            }
            other => panic!("Expected OpenSessionEnded, got {:?}", other),
        }
        assert!(cache.open_session_id().is_none());
        assert!(cache.is_closed(&a));
        assert_eq!(cache.sessions().count(), 0);

        // Late traffic for an ended session is ignored
        assert_eq!(cache.apply(&msg(&a, "late")), PresenceUpdate::Unchanged);
        assert_eq!(cache.sessions().count(), 0);
    }

    #[test]
    fn test_user_left_on_background_session_removes_row() {
        let mut cache = ClientPresenceCache::new();
        let a = SessionId::new();
        let b = SessionId::new();
        cache.open(a.clone());
        cache.apply(&msg(&b, "hi"));

        assert_eq!(
            cache.apply(&user_left(&b)),
            PresenceUpdate::Removed { session_id: b }
        );
        assert_eq!(cache.open_session_id(), Some(&a));
        assert_eq!(cache.total_unread(), 0);
    }

    #[test]
    fn test_need_human_clears_local_closed_mark() {
        let mut cache = ClientPresenceCache::new();
        let a = SessionId::new();
        cache.apply(&user_left(&a));
        assert!(cache.is_closed(&a));

        assert_eq!(
            cache.apply(&need_human(&a)),
            PresenceUpdate::HumanRequested {
                session_id: a.clone()
            }
        );
        assert!(!cache.is_closed(&a));
        let entry = cache.sessions().next().unwrap();
        assert!(entry.needs_human);
        assert_eq!(entry.user_identity.as_deref(), Some("amy@example.com"));
    }
}
