//! Session room management for pub/sub
//!
//! Maps each session to the endpoints subscribed to it, keeps the reverse
//! index used on disconnect, and tracks the admin-wide audience that receives
//! escalation notices. Pure transport: nothing here is persisted and events
//! with no recipient are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use helpline_shared::{ActorRole, EndpointId, ServerEvent, SessionId};

use super::connection::{Connection, DeliveryError};

/// Who an outbound event is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Endpoints subscribed to one session
    Session(SessionId),
    /// Every connected admin endpoint
    Admins,
    /// Session subscribers plus every admin endpoint, each reached once
    SessionAndAdmins(SessionId),
}

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

impl Delivery {
    pub fn recipients(&self) -> usize {
        self.delivered + self.dropped
    }
}

#[derive(Debug, Clone)]
struct Subscriber {
    conn: Arc<Connection>,
    role: ActorRole,
}

#[derive(Default)]
struct Rooms {
    /// session_id -> endpoint_id -> subscriber
    sessions: HashMap<SessionId, HashMap<EndpointId, Subscriber>>,
    /// endpoint_id -> sessions it is subscribed to
    endpoints: HashMap<EndpointId, HashSet<SessionId>>,
    /// endpoints receiving admin-wide notices
    admins: HashMap<EndpointId, Arc<Connection>>,
}

/// Manages session "rooms" for broadcasting events
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<Rooms>,
}

impl RoomRegistry {
    /// Create a new room registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a session room
    ///
    /// Idempotent: returns `false` if the endpoint was already subscribed.
    pub async fn subscribe(&self, conn: Arc<Connection>, role: ActorRole, session_id: SessionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let endpoint_id = conn.endpoint_id;

        let room = rooms.sessions.entry(session_id.clone()).or_default();
        if room.contains_key(&endpoint_id) {
            return false;
        }
        room.insert(endpoint_id, Subscriber { conn, role });
        let room_size = room.len();

        rooms
            .endpoints
            .entry(endpoint_id)
            .or_default()
            .insert(session_id.clone());

        tracing::debug!(
            session_id = %session_id,
            endpoint_id = %endpoint_id,
            role = %role,
            room_size,
            "Endpoint joined session room"
        );
        true
    }

    /// Remove a connection from a session room
    pub async fn unsubscribe(&self, endpoint_id: EndpointId, session_id: &SessionId) -> bool {
        let mut rooms = self.rooms.write().await;

        let removed = match rooms.sessions.get_mut(session_id) {
            Some(room) => {
                let removed = room.remove(&endpoint_id).is_some();
                if room.is_empty() {
                    rooms.sessions.remove(session_id);
                    tracing::debug!(session_id = %session_id, "Removed empty session room");
                }
                removed
            }
            None => false,
        };

        if let Some(subscribed) = rooms.endpoints.get_mut(&endpoint_id) {
            subscribed.remove(session_id);
            if subscribed.is_empty() {
                rooms.endpoints.remove(&endpoint_id);
            }
        }

        if removed {
            tracing::debug!(
                session_id = %session_id,
                endpoint_id = %endpoint_id,
                "Endpoint left session room"
            );
        }
        removed
    }

    /// Add an admin endpoint to the admin-wide audience
    pub async fn join_admin_audience(&self, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let endpoint_id = conn.endpoint_id;
        rooms.admins.insert(endpoint_id, conn);
        tracing::debug!(
            endpoint_id = %endpoint_id,
            admin_count = rooms.admins.len(),
            "Endpoint joined admin audience"
        );
    }

    /// Remove an endpoint from every room and from the admin audience
    ///
    /// Walks only the sessions this endpoint was subscribed to. Returns those
    /// sessions with the role of each dropped subscription.
    pub async fn on_disconnect(&self, endpoint_id: EndpointId) -> Vec<(SessionId, ActorRole)> {
        let mut rooms = self.rooms.write().await;
        rooms.admins.remove(&endpoint_id);

        let subscribed = rooms.endpoints.remove(&endpoint_id).unwrap_or_default();
        let mut removed = Vec::with_capacity(subscribed.len());

        for session_id in subscribed {
            let Some(room) = rooms.sessions.get_mut(&session_id) else {
                continue;
            };
            if let Some(subscriber) = room.remove(&endpoint_id) {
                removed.push((session_id.clone(), subscriber.role));
            }
            if room.is_empty() {
                rooms.sessions.remove(&session_id);
            }
        }

        if !removed.is_empty() {
            tracing::debug!(
                endpoint_id = %endpoint_id,
                session_count = removed.len(),
                "Removed endpoint from session rooms"
            );
        }
        removed
    }

    /// Deliver an event to every endpoint in the audience
    ///
    /// Sends never wait: a full or closed endpoint queue counts as a drop and
    /// the fan-out moves on.
    pub async fn deliver(&self, audience: &Audience, event: ServerEvent) -> Delivery {
        let recipients = self.recipients(audience).await;
        let mut delivery = Delivery::default();

        for conn in &recipients {
            match conn.send(event.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(reason) => {
                    delivery.dropped += 1;
                    tracing::warn!(
                        endpoint_id = %conn.endpoint_id,
                        reason = ?reason,
                        event_type = event.event_type(),
                        "Failed to deliver event to endpoint"
                    );
                    if reason == DeliveryError::Closed {
                        tracing::debug!(endpoint_id = %conn.endpoint_id, "Endpoint queue closed");
                    }
                }
            }
        }

        if recipients.is_empty() {
            tracing::debug!(
                audience = ?audience,
                event_type = event.event_type(),
                "No subscribers - event dropped"
            );
        } else {
            tracing::debug!(
                audience = ?audience,
                event_type = event.event_type(),
                recipients = delivery.delivered,
                dropped = delivery.dropped,
                "Broadcast event"
            );
        }
        delivery
    }

    /// Broadcast an event to all connections in a session room
    pub async fn broadcast(&self, session_id: &SessionId, event: ServerEvent) -> Delivery {
        self.deliver(&Audience::Session(session_id.clone()), event).await
    }

    /// Snapshot the audience so no lock is held while sending
    async fn recipients(&self, audience: &Audience) -> Vec<Arc<Connection>> {
        let rooms = self.rooms.read().await;
        let room_members = |session_id: &SessionId| {
            rooms
                .sessions
                .get(session_id)
                .into_iter()
                .flat_map(|room| room.values().map(|s| Arc::clone(&s.conn)))
        };

        match audience {
            Audience::Session(session_id) => room_members(session_id).collect(),
            Audience::Admins => rooms.admins.values().cloned().collect(),
            Audience::SessionAndAdmins(session_id) => {
                let mut seen = HashSet::new();
                room_members(session_id)
                    .chain(rooms.admins.values().cloned())
                    .filter(|conn| seen.insert(conn.endpoint_id))
                    .collect()
            }
        }
    }

    pub async fn is_subscribed(&self, endpoint_id: EndpointId, session_id: &SessionId) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .sessions
            .get(session_id)
            .is_some_and(|room| room.contains_key(&endpoint_id))
    }

    /// Whether any user-role endpoint of `identity` is still in the room
    pub async fn has_user_subscriber(&self, session_id: &SessionId, identity: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms.sessions.get(session_id).is_some_and(|room| {
            room.values()
                .any(|s| s.role == ActorRole::User && s.conn.actor.identity == identity)
        })
    }

    /// Get room size (number of connections) for a session
    pub async fn room_size(&self, session_id: &SessionId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.sessions.get(session_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.sessions.len()
    }

    /// Number of admin endpoints receiving escalation notices
    pub async fn admin_count(&self) -> usize {
        self.rooms.read().await.admins.len()
    }
}
