//! Operator console: presence cache wired to the driver and history client

use tokio::sync::mpsc;

use helpline_shared::{ClientEvent, Message, ServerEvent, SessionId};

use crate::error::ClientError;
use crate::history::HistoryClient;
use crate::presence::{ClientPresenceCache, PresenceUpdate};

pub struct OperatorConsole {
    presence: ClientPresenceCache,
    history: HistoryClient,
    outbound: mpsc::Sender<ClientEvent>,
}

impl OperatorConsole {
    /// `outbound` feeds a running `ChatDriver`
    pub fn new(history: HistoryClient, outbound: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            presence: ClientPresenceCache::new(),
            history,
            outbound,
        }
    }

    pub fn presence(&self) -> &ClientPresenceCache {
        &self.presence
    }

    /// Seed the session list from the server
    pub async fn load_sessions(&mut self) -> Result<usize, ClientError> {
        let mut listing = self.history.open_sessions().await?;
        let count = listing.len();
        // Oldest first so the most recently updated ends up on top
        listing.sort_by_key(|s| s.updated_at);
        for session in listing {
            self.presence
                .track(session.session_id, Some(session.user_identity));
        }
        Ok(count)
    }

    /// Open a conversation: reset its badge, subscribe, and fetch its log
    pub async fn open_session(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Message>, ClientError> {
        let open = self.presence.open(session_id);
        self.send(open.subscribe).await?;
        self.history.messages(&open.session_id).await
    }

    pub fn apply(&mut self, event: &ServerEvent) -> PresenceUpdate {
        self.presence.apply(event)
    }

    /// Reply in the open conversation
    pub async fn reply(&self, message: impl Into<String>) -> Result<(), ClientError> {
        let session_id = self.open_session_id()?;
        self.send(ClientEvent::AdminReply {
            session_id,
            message: message.into(),
        })
        .await
    }

    /// End the open conversation for everyone
    pub async fn close_open_session(&self) -> Result<(), ClientError> {
        let session_id = self.open_session_id()?;
        self.send(ClientEvent::CloseSession { session_id }).await
    }

    fn open_session_id(&self) -> Result<String, ClientError> {
        self.presence
            .open_session_id()
            .map(|id| id.as_str().to_string())
            .ok_or(ClientError::Closed)
    }

    async fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| ClientError::Closed)
    }
}
