//! Endpoint connection management
//!
//! Represents one connected `/chat` endpoint (a browser tab or an admin
//! console) with a bounded outbound queue.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use helpline_shared::{Actor, EndpointId, ServerEvent};

/// Why an event did not reach an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbound queue is full; the endpoint is not keeping up
    Full,
    /// The endpoint's writer task is gone
    Closed,
}

/// Represents an active endpoint connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this connection; a reconnect gets a new one
    pub endpoint_id: EndpointId,

    /// Authenticated actor behind this endpoint
    pub actor: Actor,

    /// Channel to the endpoint's writer task
    sender: mpsc::Sender<ServerEvent>,

    /// Events dropped because the queue was full or closed
    dropped_events: AtomicU64,
}

impl Connection {
    /// Create a new connection
    pub fn new(actor: Actor, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            endpoint_id: EndpointId::new(),
            actor,
            sender,
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Queue an event for this endpoint without waiting
    pub fn send(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                match err {
                    mpsc::error::TrySendError::Full(_) => Err(DeliveryError::Full),
                    mpsc::error::TrySendError::Closed(_) => Err(DeliveryError::Closed),
                }
            }
        }
    }

    /// Total events dropped for this endpoint
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let conn = Connection::new(Actor::user("amy@example.com"), tx);

        conn.send(ServerEvent::Pong).unwrap();
        assert_eq!(rx.recv().await, Some(ServerEvent::Pong));
        assert_eq!(conn.dropped_events(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(Actor::user("amy@example.com"), tx);

        assert!(conn.send(ServerEvent::Pong).is_ok());
        assert_eq!(conn.send(ServerEvent::Pong), Err(DeliveryError::Full));
        assert_eq!(conn.dropped_events(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        let conn = Connection::new(Actor::admin("ops@example.com"), tx);
        drop(rx);

        assert!(conn.is_closed());
        assert_eq!(conn.send(ServerEvent::Pong), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_each_connection_gets_a_fresh_endpoint_id() {
        let (tx, _rx) = mpsc::channel(1);
        let a = Connection::new(Actor::user("amy@example.com"), tx.clone());
        let b = Connection::new(Actor::user("amy@example.com"), tx);
        assert_ne!(a.endpoint_id, b.endpoint_id);
    }
}
