//! Reconnecting chat driver
//!
//! Keeps one transport alive for the widget or console. The server forgets an
//! endpoint's subscriptions when it disconnects, so the driver remembers every
//! `subscribe_to_session` it forwarded and replays them, in order, after each
//! successful connect. A user driver also resubscribes to the session its
//! context learned from the server. Sessions are forgotten on unsubscribe and
//! when the server reports them ended. After `max_attempts` consecutive
//! connect failures the driver reports `Disconnected` and stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use helpline_shared::{ActorRole, ClientEvent, ServerEvent, SessionId};

use crate::context::ClientSessionContext;
use crate::transport::{Connector, Transport};

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed connects before giving up
    pub max_attempts: usize,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delays between attempts: base, 2x base, 4x base ... capped, with jitter.
    /// The first attempt is immediate so the iterator holds one fewer delay.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1))
            .map(jitter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// The transport dropped and the driver is connecting again
    Reconnecting,
    /// Connect attempts exhausted; the driver has stopped
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Status(ConnectionStatus),
    Server(ServerEvent),
}

pub struct ChatDriver<C: Connector> {
    connector: C,
    policy: ReconnectPolicy,
    role: ActorRole,
    context: Arc<Mutex<ClientSessionContext>>,
    /// Sessions subscribed through this driver, oldest first
    subscriptions: Vec<(String, ActorRole)>,
}

enum Exit {
    /// The caller dropped its outbound sender
    Shutdown,
    TransportLost,
}

impl<C: Connector> ChatDriver<C> {
    pub fn new(
        connector: C,
        policy: ReconnectPolicy,
        role: ActorRole,
        context: Arc<Mutex<ClientSessionContext>>,
    ) -> Self {
        Self {
            connector,
            policy,
            role,
            context,
            subscriptions: Vec::new(),
        }
    }

    pub fn context(&self) -> Arc<Mutex<ClientSessionContext>> {
        self.context.clone()
    }

    /// Drive the connection until the caller hangs up or reconnects run out.
    /// Outbound events sent while disconnected wait in `outbound`.
    pub async fn run(
        mut self,
        mut outbound: mpsc::Receiver<ClientEvent>,
        events: mpsc::Sender<DriverEvent>,
    ) {
        loop {
            let connector = &self.connector;
            let connected = Retry::spawn(self.policy.delays(), || async move {
                connector.connect().await.inspect_err(|e| {
                    tracing::debug!(error = %e, "Connect attempt failed");
                })
            })
            .await;

            let mut transport = match connected {
                Ok(transport) => transport,
                Err(e) => {
                    tracing::warn!(error = %e, "Giving up on chat connection");
                    let _ = events
                        .send(DriverEvent::Status(ConnectionStatus::Disconnected))
                        .await;
                    return;
                }
            };

            if events
                .send(DriverEvent::Status(ConnectionStatus::Connected))
                .await
                .is_err()
            {
                return;
            }

            if !self.resubscribe(&mut transport).await {
                let _ = events
                    .send(DriverEvent::Status(ConnectionStatus::Reconnecting))
                    .await;
                continue;
            }

            match self.pump(&mut transport, &mut outbound, &events).await {
                Exit::Shutdown => return,
                Exit::TransportLost => {
                    tracing::info!("Chat connection lost, reconnecting");
                    if events
                        .send(DriverEvent::Status(ConnectionStatus::Reconnecting))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    async fn resubscribe(&self, transport: &mut C::Transport) -> bool {
        let mut targets = self.subscriptions.clone();
        if self.role == ActorRole::User {
            let current = self.context.lock().await.current().cloned();
            if let Some(session_id) = current {
                if !targets.iter().any(|(id, _)| id == session_id.as_str()) {
                    targets.insert(0, (session_id.as_str().to_string(), self.role));
                }
            }
        }

        for (session_id, role) in targets {
            let event = ClientEvent::SubscribeToSession {
                session_id: session_id.clone(),
                role,
            };
            if let Err(e) = transport.send(&event).await {
                tracing::debug!(error = %e, "Resubscribe failed");
                return false;
            }
            tracing::debug!(session_id = %session_id, "Resubscribed after connect");
        }
        true
    }

    fn remember(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::SubscribeToSession { session_id, role } => {
                if !self.subscriptions.iter().any(|(id, _)| id == session_id) {
                    self.subscriptions.push((session_id.clone(), *role));
                }
            }
            ClientEvent::UnsubscribeFromSession { session_id } => {
                self.subscriptions.retain(|(id, _)| id != session_id);
            }
            _ => {}
        }
    }

    fn forget_ended(&mut self, event: &ServerEvent) {
        let ended: Option<&SessionId> = match event {
            ServerEvent::UserLeft { session_id, .. }
            | ServerEvent::SessionClosed { session_id, .. } => Some(session_id),
            _ => None,
        };
        if let Some(ended) = ended {
            self.subscriptions.retain(|(id, _)| id != ended.as_str());
        }
    }

    async fn pump(
        &mut self,
        transport: &mut C::Transport,
        outbound: &mut mpsc::Receiver<ClientEvent>,
        events: &mpsc::Sender<DriverEvent>,
    ) -> Exit {
        loop {
            tokio::select! {
                next = outbound.recv() => {
                    let Some(event) = next else {
                        return Exit::Shutdown;
                    };
                    if self.role == ActorRole::User && matches!(event, ClientEvent::RequestHuman) {
                        self.context.lock().await.escalate();
                    }
                    self.remember(&event);
                    if let Err(e) = transport.send(&event).await {
                        tracing::debug!(error = %e, "Send failed");
                        return Exit::TransportLost;
                    }
                }
                incoming = transport.next_event() => {
                    match incoming {
                        Some(Ok(event)) => {
                            if self.role == ActorRole::User {
                                self.context.lock().await.observe(&event);
                            }
                            self.forget_ended(&event);
                            if events.send(DriverEvent::Server(event)).await.is_err() {
                                return Exit::Shutdown;
                            }
                        }
                        Some(Err(e)) if e.is_transient() => {
                            tracing::debug!(error = %e, "Transport error");
                            return Exit::TransportLost;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Ignoring unreadable server event");
                        }
                        None => return Exit::TransportLost,
                    }
                }
            }
        }
    }
}
