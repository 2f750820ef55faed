//! Global WebSocket state management
//!
//! Maintains the table of live `/chat` endpoints alongside the room registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use helpline_shared::EndpointId;

use super::connection::Connection;
use super::room::RoomRegistry;

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by endpoint_id
    pub connections: Arc<RwLock<HashMap<EndpointId, Arc<Connection>>>>,

    /// Session rooms and the admin audience
    pub rooms: Arc<RoomRegistry>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomRegistry::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.endpoint_id, Arc::clone(&conn));

        tracing::info!(
            endpoint_id = %conn.endpoint_id,
            identity = %conn.actor.identity,
            role = %conn.actor.role,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection from the table
    ///
    /// Room membership is torn down separately by the coordinator, which needs
    /// the list of dropped subscriptions.
    pub async fn remove_connection(&self, endpoint_id: &EndpointId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(endpoint_id);
        if let Some(conn) = &removed {
            tracing::info!(
                endpoint_id = %endpoint_id,
                identity = %conn.actor.identity,
                dropped_events = conn.dropped_events(),
                remaining_connections = connections.len(),
                "WebSocket connection removed"
            );
        }
        removed
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        let (active_connections, dropped_events) = {
            let connections = self.connections.read().await;
            let dropped = connections.values().map(|c| c.dropped_events()).sum();
            (connections.len(), dropped)
        };
        WebSocketStats {
            active_connections,
            dropped_events,
            active_rooms: self.rooms.room_count().await,
            admin_endpoints: self.rooms.admin_count().await,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebSocketStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Events dropped on full endpoint queues, summed over live connections
    pub dropped_events: u64,
    /// Number of session rooms with at least one subscriber
    pub active_rooms: usize,
    /// Number of endpoints in the admin audience
    pub admin_endpoints: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpline_shared::Actor;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::channel(4);

        let conn = Connection::new(Actor::user("amy@example.com"), tx);
        let endpoint_id = conn.endpoint_id;

        let added = state.add_connection(conn).await;
        assert_eq!(state.connection_count().await, 1);
        assert_eq!(added.actor.identity, "amy@example.com");

        assert!(state.remove_connection(&endpoint_id).await.is_some());
        assert!(state.remove_connection(&endpoint_id).await.is_none());
        assert_eq!(state.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::channel(4);

        let conn = state.add_connection(Connection::new(Actor::admin("ops@example.com"), tx)).await;
        state.rooms.join_admin_audience(conn).await;

        let stats = state.get_stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.active_rooms, 0);
        assert_eq!(stats.admin_endpoints, 1);
        assert_eq!(stats.dropped_events, 0);
    }
}
